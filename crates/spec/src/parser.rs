// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The element-level state machine.
//!
//! Structural characters are all ASCII, so scanning advances over byte
//! positions and slices the source at structural boundaries; element
//! payloads (SQL text, file names) pass through as written.

use heliodb_type::{Error, Result, time};
use tracing::instrument;

use crate::{
	Filter, PkFilter, RecordSetSpec, SpecKind, SubSpec,
	atfile::{self, HomeLookup, SystemHome},
};

/// Includes may nest (a listed file may itself contain `@file`), but not
/// unboundedly.
const MAX_INCLUDE_DEPTH: usize = 8;

/// Parse a specification with the system home-directory lookup.
pub fn parse(spec: &str) -> Result<RecordSetSpec> {
	Parser::new(&SystemHome).parse(spec)
}

pub struct Parser<'a> {
	home: &'a dyn HomeLookup,
}

impl<'a> Parser<'a> {
	pub fn new(home: &'a dyn HomeLookup) -> Self {
		Self {
			home,
		}
	}

	#[instrument(level = "trace", skip(self, spec))]
	pub fn parse(&self, spec: &str) -> Result<RecordSetSpec> {
		let mut out = RecordSetSpec::default();
		self.parse_into(spec, &mut out, 0)?;
		out.has_filters = out.sub_specs.iter().any(SubSpec::has_filters);
		Ok(out)
	}

	fn parse_into(&self, spec: &str, out: &mut RecordSetSpec, depth: usize) -> Result<()> {
		if depth > MAX_INCLUDE_DEPTH {
			return Err(Error::InvalidSpec("include files nest too deeply".into()));
		}
		let mut scan = Scanner::new(spec);
		loop {
			scan.skip_blank();
			scan.skip_comment();
			if scan.at_end() {
				return Ok(());
			}
			if scan.eat_delimiter() {
				continue;
			}
			self.parse_element(&mut scan, out, depth)?;
			scan.skip_blank();
			// A comment terminates the element just as a delimiter does.
			let comment_ended = scan.peek() == b'#';
			scan.skip_comment();
			if !scan.at_end() && !scan.eat_delimiter() && !comment_ended {
				return Err(Error::InvalidSpec(format!(
					"unexpected character '{}' after element",
					scan.peek_char()
				)));
			}
		}
	}

	fn parse_element(&self, scan: &mut Scanner<'_>, out: &mut RecordSetSpec, depth: usize) -> Result<()> {
		match scan.peek() {
			b'{' => {
				let sub = parse_curly(scan)?;
				out.sub_specs.push(sub);
			}
			b'@' => {
				scan.advance(1);
				let name = scan.take_until(|b| is_delimiter(b) || b.is_ascii_whitespace() || b == b'#');
				if name.is_empty() {
					return Err(Error::InvalidSpec("'@' with no file name".into()));
				}
				let lines = atfile::read_spec_file(name, self.home)?;
				for line in &lines {
					self.parse_into(line, out, depth + 1)?;
				}
				out.has_at_file = true;
			}
			b'/' | b'.' => {
				let path = scan.take_until(|b| is_delimiter(b) || b == b'#');
				out.sub_specs.push(SubSpec {
					all_versions: false,
					raw: path.trim().to_string(),
					kind: SpecKind::PlainFile,
					series: String::new(),
					filters: Vec::new(),
					seglist: Vec::new(),
				});
			}
			_ => {
				let sub = parse_drms(scan)?;
				out.sub_specs.push(sub);
			}
		}
		Ok(())
	}
}

/// `{vot:…}`, `{prog:…}`, or a bare legacy dataset id in braces.
fn parse_curly(scan: &mut Scanner<'_>) -> Result<SubSpec> {
	let inner = scan.take_braced()?;
	let inner = inner.trim();
	if inner.is_empty() {
		return Err(Error::InvalidSpec("empty braced element".into()));
	}
	let kind = if inner.len() >= 4 && inner[..4].eq_ignore_ascii_case("vot:") {
		SpecKind::Vot
	} else if inner.len() >= 5 && inner[..5].eq_ignore_ascii_case("prog:") {
		SpecKind::LegacyPort
	} else {
		SpecKind::Legacy
	};
	Ok(SubSpec {
		all_versions: false,
		raw: inner.to_string(),
		kind,
		series: String::new(),
		filters: Vec::new(),
		seglist: Vec::new(),
	})
}

fn parse_drms(scan: &mut Scanner<'_>) -> Result<SubSpec> {
	let series = scan.take_while(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');
	if series.is_empty() {
		return Err(Error::InvalidSpec(format!("unexpected character '{}'", scan.peek_char())));
	}

	let mut sub = SubSpec {
		all_versions: false,
		raw: String::new(),
		kind: SpecKind::Drms,
		series: series.to_ascii_lowercase(),
		filters: Vec::new(),
		seglist: Vec::new(),
	};

	loop {
		scan.skip_spaces();
		match scan.peek() {
			b'[' => {
				let filter = parse_filter(scan)?;
				if matches!(
					filter,
					Filter::Sql {
						all_versions: true,
						..
					}
				) {
					sub.all_versions = true;
				}
				sub.filters.push(filter);
			}
			b'{' => {
				sub.seglist = parse_seglist(scan)?;
				break;
			}
			_ => break,
		}
	}

	// The canonical rendering doubles as the retained sub-spec query text.
	sub.raw = sub.to_string();
	Ok(sub)
}

fn parse_filter(scan: &mut Scanner<'_>) -> Result<Filter> {
	scan.advance(1); // '['
	scan.skip_spaces();
	match scan.peek() {
		b'?' => {
			scan.advance(1);
			let text = scan.take_sql_filter(b'?')?;
			Ok(Filter::Sql {
				text: convert_time_literals(&text)?,
				all_versions: false,
			})
		}
		b'!' => {
			scan.advance(1);
			let text = scan.take_sql_filter(b'!')?;
			Ok(Filter::Sql {
				text: convert_time_literals(&text)?,
				all_versions: true,
			})
		}
		_ => {
			let inner = scan.take_bracketed()?;
			Ok(Filter::Pk(PkFilter::parse(&inner)?))
		}
	}
}

fn parse_seglist(scan: &mut Scanner<'_>) -> Result<Vec<String>> {
	let inner = scan.take_braced()?;
	let segs: Vec<String> = inner
		.split([',', ';', ':'])
		.map(|s| s.trim().to_ascii_lowercase())
		.filter(|s| !s.is_empty())
		.collect();
	if segs.is_empty() {
		return Err(Error::InvalidSpec("empty segment list".into()));
	}
	Ok(segs)
}

/// Replace each `$(…)` calendar literal with its numeric seconds value.
fn convert_time_literals(text: &str) -> Result<String> {
	let mut result = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(start) = rest.find("$(") {
		result.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		let end = after
			.find(')')
			.ok_or_else(|| Error::InvalidSpec(format!("unterminated time literal in '{text}'")))?;
		let seconds = time::parse(&after[..end])
			.map_err(|_| Error::InvalidSpec(format!("bad time literal '{}'", &after[..end])))?;
		result.push_str(&seconds.to_string());
		rest = &after[end + 1..];
	}
	result.push_str(rest);
	Ok(result)
}

fn is_delimiter(b: u8) -> bool {
	matches!(b, b',' | b';' | b'\n')
}

struct Scanner<'a> {
	src: &'a str,
	pos: usize,
}

impl<'a> Scanner<'a> {
	fn new(src: &'a str) -> Self {
		Self {
			src,
			pos: 0,
		}
	}

	fn at_end(&self) -> bool {
		self.pos >= self.src.len()
	}

	/// The byte at the cursor; 0 at end of input.
	fn peek(&self) -> u8 {
		self.src.as_bytes().get(self.pos).copied().unwrap_or(0)
	}

	fn peek_char(&self) -> char {
		self.src[self.pos..].chars().next().unwrap_or('\0')
	}

	fn advance(&mut self, n: usize) {
		self.pos = (self.pos + n).min(self.src.len());
	}

	fn skip_spaces(&mut self) {
		while matches!(self.peek(), b' ' | b'\t' | b'\r') {
			self.pos += 1;
		}
	}

	/// Spaces only; a newline is a delimiter, not blank space.
	fn skip_blank(&mut self) {
		self.skip_spaces();
	}

	/// `#…#` or `#` to end of line.
	fn skip_comment(&mut self) {
		while self.peek() == b'#' {
			self.pos += 1;
			while !self.at_end() && self.peek() != b'#' && self.peek() != b'\n' {
				self.pos += 1;
			}
			if self.peek() == b'#' {
				self.pos += 1;
			}
			self.skip_spaces();
		}
	}

	fn eat_delimiter(&mut self) -> bool {
		if is_delimiter(self.peek()) {
			self.pos += 1;
			true
		} else {
			false
		}
	}

	fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a str {
		let start = self.pos;
		while !self.at_end() && keep(self.peek()) {
			self.pos += 1;
		}
		&self.src[start..self.pos]
	}

	fn take_until(&mut self, stop: impl Fn(u8) -> bool) -> &'a str {
		self.take_while(|b| !stop(b))
	}

	/// Consume `{…}` (cursor on the brace) and return the inside.
	fn take_braced(&mut self) -> Result<String> {
		self.expect(b'{')?;
		let start = self.pos;
		let mut depth = 1usize;
		let mut quote = 0u8;
		while !self.at_end() {
			let b = self.peek();
			if quote != 0 {
				if b == quote {
					quote = 0;
				}
			} else {
				match b {
					b'\'' | b'"' => quote = b,
					b'{' => depth += 1,
					b'}' => {
						depth -= 1;
						if depth == 0 {
							let inner = &self.src[start..self.pos];
							self.pos += 1;
							return Ok(inner.to_string());
						}
					}
					_ => {}
				}
			}
			self.pos += 1;
		}
		Err(Error::InvalidSpec("unterminated '{'".into()))
	}

	/// Consume a balanced `[…]` body (cursor past the opening bracket).
	fn take_bracketed(&mut self) -> Result<String> {
		let start = self.pos;
		let mut depth = 1usize;
		let mut quote = 0u8;
		while !self.at_end() {
			let b = self.peek();
			if quote != 0 {
				if b == quote {
					quote = 0;
				}
			} else {
				match b {
					b'\'' | b'"' => quote = b,
					b'[' => depth += 1,
					b']' => {
						depth -= 1;
						if depth == 0 {
							let inner = &self.src[start..self.pos];
							self.pos += 1;
							return Ok(inner.to_string());
						}
					}
					_ => {}
				}
			}
			self.pos += 1;
		}
		Err(Error::InvalidSpec("unterminated '['".into()))
	}

	/// Consume the body of a SQL filter up to `mark` followed by `]`,
	/// respecting matching quotes.
	fn take_sql_filter(&mut self, mark: u8) -> Result<String> {
		let start = self.pos;
		let mut quote = 0u8;
		while !self.at_end() {
			let b = self.peek();
			if quote != 0 {
				if b == quote {
					quote = 0;
				}
				self.pos += 1;
				continue;
			}
			match b {
				b'\'' | b'"' => {
					quote = b;
					self.pos += 1;
				}
				_ if b == mark && self.src.as_bytes().get(self.pos + 1) == Some(&b']') => {
					let inner = self.src[start..self.pos].trim().to_string();
					self.pos += 2;
					if inner.is_empty() {
						return Err(Error::InvalidSpec("empty SQL filter".into()));
					}
					return Ok(inner);
				}
				_ => self.pos += 1,
			}
		}
		Err(Error::InvalidSpec(format!("unterminated '{}' filter", mark as char)))
	}

	fn expect(&mut self, b: u8) -> Result<()> {
		if self.peek() == b {
			self.pos += 1;
			Ok(())
		} else {
			Err(Error::InvalidSpec(format!("expected '{}', found '{}'", b as char, self.peek_char())))
		}
	}
}
