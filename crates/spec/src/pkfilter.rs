// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Structural parse of a primary-key bracket filter.
//!
//! Values stay textual here; the query builder converts them against the
//! keyword's type (times in particular) when the WHERE clause is assembled.

use std::fmt::{Display, Formatter};

use heliodb_type::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum PkOp {
	/// A single value.
	Eq(String),
	/// An inclusive `lo-hi` range.
	Range(String, String),
	/// A comma-separated value list.
	In(Vec<String>),
	/// `first`/`last`/`first(n)`/`last(n)`; negative counts select from
	/// the end and produce descending order.
	FirstLast(i64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PkFilter {
	/// Keyword the filter addresses; positional filters leave this unset
	/// and bind to the next unbound primary-index keyword. The name
	/// `recnum` addresses the record number itself.
	pub name: Option<String>,
	pub op: PkOp,
}

impl PkFilter {
	/// Parse the inside of a `[…]` clause that is not a SQL filter.
	pub fn parse(text: &str) -> Result<Self> {
		let text = text.trim();
		if text.is_empty() {
			return Err(Error::InvalidSpec("empty bracket filter".into()));
		}
		let (name, value) = match split_name(text) {
			Some((name, value)) => (Some(name.to_ascii_lowercase()), value),
			None => (None, text),
		};
		let op = parse_op(value)?;
		Ok(Self {
			name,
			op,
		})
	}
}

/// Split `name=value`, rejecting `=` inside quotes and comparison operators.
fn split_name(text: &str) -> Option<(&str, &str)> {
	let eq = text.find('=')?;
	let name = &text[..eq];
	if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
		return None;
	}
	Some((name, &text[eq + 1..]))
}

fn parse_op(value: &str) -> Result<PkOp> {
	let value = value.trim();
	if value.is_empty() {
		return Err(Error::InvalidSpec("bracket filter has no value".into()));
	}

	if let Some(n) = parse_first_last(value)? {
		return Ok(PkOp::FirstLast(n));
	}

	if value.contains(',') {
		let items: Vec<String> =
			value.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect();
		if items.is_empty() {
			return Err(Error::InvalidSpec(format!("bad value list '{value}'")));
		}
		return Ok(PkOp::In(items));
	}

	// A '-' past the first character splits a range; a leading '-' is a
	// sign. Calendar values contain '.'/'_' but never '-' internally.
	if let Some(dash) = value[1..].find('-').map(|i| i + 1) {
		let (lo, hi) = (value[..dash].trim(), value[dash + 1..].trim());
		if lo.is_empty() || hi.is_empty() {
			return Err(Error::InvalidSpec(format!("bad range '{value}'")));
		}
		return Ok(PkOp::Range(lo.to_string(), hi.to_string()));
	}

	Ok(PkOp::Eq(value.to_string()))
}

fn parse_first_last(value: &str) -> Result<Option<i64>> {
	let (sign, rest) = if let Some(rest) = value.strip_prefix("first") {
		(1, rest)
	} else if let Some(rest) = value.strip_prefix("last") {
		(-1, rest)
	} else {
		return Ok(None);
	};
	let rest = rest.trim();
	if rest.is_empty() {
		return Ok(Some(sign));
	}
	let Some(n) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
		// Something like `firstlight`: an ordinary value.
		return Ok(None);
	};
	let n: i64 = n
		.trim()
		.parse()
		.map_err(|_| Error::InvalidSpec(format!("bad record count in '{value}'")))?;
	if n <= 0 {
		return Err(Error::BadRecordCount(n));
	}
	Ok(Some(sign * n))
}

impl Display for PkFilter {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if let Some(name) = &self.name {
			write!(f, "{name}=")?;
		}
		match &self.op {
			PkOp::Eq(v) => f.write_str(v),
			PkOp::Range(lo, hi) => write!(f, "{lo}-{hi}"),
			PkOp::In(items) => f.write_str(&items.join(",")),
			PkOp::FirstLast(1) => f.write_str("first"),
			PkOp::FirstLast(-1) => f.write_str("last"),
			PkOp::FirstLast(n) if *n > 0 => write!(f, "first({n})"),
			PkOp::FirstLast(n) => write!(f, "last({})", -n),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(text: &str) -> PkFilter {
		PkFilter::parse(text).unwrap()
	}

	#[test]
	fn test_positional_single() {
		let f = parse("2010.01.01");
		assert_eq!(f.name, None);
		assert_eq!(f.op, PkOp::Eq("2010.01.01".into()));
	}

	#[test]
	fn test_named_single() {
		let f = parse("T_OBS=2010.01.01_12:00:00_TAI");
		assert_eq!(f.name.as_deref(), Some("t_obs"));
		assert_eq!(f.op, PkOp::Eq("2010.01.01_12:00:00_TAI".into()));
	}

	#[test]
	fn test_range() {
		assert_eq!(parse("5-10").op, PkOp::Range("5".into(), "10".into()));
		assert_eq!(
			parse("2010.01.01-2010.02.01").op,
			PkOp::Range("2010.01.01".into(), "2010.02.01".into())
		);
	}

	#[test]
	fn test_leading_minus_is_a_sign() {
		assert_eq!(parse("-5").op, PkOp::Eq("-5".into()));
		assert_eq!(parse("-5--2").op, PkOp::Range("-5".into(), "-2".into()));
	}

	#[test]
	fn test_list() {
		assert_eq!(parse("1,2,3").op, PkOp::In(vec!["1".into(), "2".into(), "3".into()]));
	}

	#[test]
	fn test_first_last() {
		assert_eq!(parse("first").op, PkOp::FirstLast(1));
		assert_eq!(parse("last").op, PkOp::FirstLast(-1));
		assert_eq!(parse("first(12)").op, PkOp::FirstLast(12));
		assert_eq!(parse("pk=last(3)").op, PkOp::FirstLast(-3));
		assert!(PkFilter::parse("first(0)").is_err());
		assert!(PkFilter::parse("last(-2)").is_err());
	}

	#[test]
	fn test_first_prefix_is_not_first_last() {
		assert_eq!(parse("firstlight").op, PkOp::Eq("firstlight".into()));
	}

	#[test]
	fn test_recnum_name() {
		let f = parse("recnum=123");
		assert_eq!(f.name.as_deref(), Some("recnum"));
	}

	#[test]
	fn test_display_round_trip() {
		for text in ["t_obs=5-10", "first(3)", "last", "1,2,3", "camera=2"] {
			let parsed = parse(text);
			assert_eq!(PkFilter::parse(&parsed.to_string()).unwrap(), parsed);
		}
	}
}
