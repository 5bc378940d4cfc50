// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::fmt::{Display, Formatter};

use heliodb_type::{Error, Result};
use serde::{Deserialize, Serialize};

/// Whether the series has a shadow summary table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowState {
	Unknown,
	Absent,
	Present,
}

/// The series catalog's version string, `"V. <major>.<minor>"` or a bare
/// `"<major>.<minor>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesVersion {
	pub major: u32,
	pub minor: u32,
}

impl SeriesVersion {
	pub fn parse(text: &str) -> Result<Self> {
		let text = text.trim();
		let text = text.strip_prefix("V.").map(str::trim).unwrap_or(text);
		if text.is_empty() {
			// Pre-versioned series predate the version column.
			return Ok(Self {
				major: 1,
				minor: 0,
			});
		}
		let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
		let parse = |t: &str| {
			t.trim().parse().map_err(|_| Error::InvalidData(format!("bad series version '{text}'")))
		};
		Ok(Self {
			major: parse(major)?,
			minor: parse(minor)?,
		})
	}

	pub fn at_least(&self, major: u32, minor: u32) -> bool {
		(self.major, self.minor) >= (major, minor)
	}
}

impl Display for SeriesVersion {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "V. {}.{}", self.major, self.minor)
	}
}

/// Immutable per-series schema header.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeriesInfo {
	pub name: String,
	pub description: String,
	pub author: String,
	pub owner: String,
	pub unitsize: i32,
	pub archive: bool,
	pub retention: i32,
	pub tapegroup: i32,
	pub version: SeriesVersion,
	/// Internal primary-index keyword names, in index order.
	pub pidx: Vec<String>,
	/// Additional db-index keyword names.
	pub dbidx: Vec<String>,
	/// Snapshot of the shadow-table state at template build; the
	/// process-wide memo is authoritative afterwards.
	pub shadow: ShadowState,
}

impl SeriesInfo {
	pub fn has_pidx(&self) -> bool {
		!self.pidx.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_version_forms() {
		assert_eq!(
			SeriesVersion::parse("V. 2.1").unwrap(),
			SeriesVersion {
				major: 2,
				minor: 1
			}
		);
		assert_eq!(
			SeriesVersion::parse("2.0").unwrap(),
			SeriesVersion {
				major: 2,
				minor: 0
			}
		);
		assert_eq!(
			SeriesVersion::parse("").unwrap(),
			SeriesVersion {
				major: 1,
				minor: 0
			}
		);
	}

	#[test]
	fn test_at_least() {
		let v = SeriesVersion::parse("V. 2.1").unwrap();
		assert!(v.at_least(2, 0));
		assert!(v.at_least(2, 1));
		assert!(!v.at_least(2, 2));
		assert!(!v.at_least(3, 0));
	}

	#[test]
	fn test_garbage_version() {
		assert!(SeriesVersion::parse("vee two").is_err());
	}
}
