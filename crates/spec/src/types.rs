// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::fmt::{Display, Formatter, Write};

use crate::pkfilter::PkFilter;

/// Classification of one element of a specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecKind {
	/// A catalog series query.
	Drms,
	/// A file or directory path.
	PlainFile,
	/// A legacy-archive dataset in braces.
	Legacy,
	/// A legacy-archive program port spec in braces.
	LegacyPort,
	/// A VOTable reference in braces.
	Vot,
}

/// One bracket clause of a DRMS element.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
	/// `[?sql?]` or `[!sql!]`; the latter selects all versions.
	Sql {
		text: String,
		all_versions: bool,
	},
	/// A primary-key filter.
	Pk(PkFilter),
}

/// One parsed element of a specification.
#[derive(Clone, Debug, PartialEq)]
pub struct SubSpec {
	/// Set by any `[!…!]` filter: suppress keep-latest-version.
	pub all_versions: bool,
	/// The element text as written.
	pub raw: String,
	pub kind: SpecKind,
	/// Series name, lower-cased; empty for non-DRMS kinds.
	pub series: String,
	/// Bracket clauses in written order.
	pub filters: Vec<Filter>,
	/// Segment names from a trailing `{…}` list, lower-cased.
	pub seglist: Vec<String>,
}

impl SubSpec {
	pub fn has_filters(&self) -> bool {
		!self.filters.is_empty()
	}

	/// Whether any filter addresses `recnum` directly.
	pub fn has_recnum_filter(&self) -> bool {
		self.filters.iter().any(|f| {
			matches!(f, Filter::Pk(pk) if pk.name.as_deref() == Some("recnum"))
		})
	}

	/// Whether any filter constrains a primary-key value.
	pub fn has_pk_filter(&self) -> bool {
		self.filters.iter().any(|f| matches!(f, Filter::Pk(_)))
	}
}

impl Display for SubSpec {
	/// Canonical re-serialization; parsing the result reproduces the same
	/// structure.
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self.kind {
			SpecKind::Drms => {
				f.write_str(&self.series)?;
				for filter in &self.filters {
					match filter {
						Filter::Sql {
							text,
							all_versions: false,
						} => write!(f, "[?{text}?]")?,
						Filter::Sql {
							text,
							all_versions: true,
						} => write!(f, "[!{text}!]")?,
						Filter::Pk(pk) => write!(f, "[{pk}]")?,
					}
				}
				if !self.seglist.is_empty() {
					f.write_char('{')?;
					f.write_str(&self.seglist.join(","))?;
					f.write_char('}')?;
				}
				Ok(())
			}
			SpecKind::PlainFile => f.write_str(&self.raw),
			SpecKind::Legacy | SpecKind::LegacyPort | SpecKind::Vot => {
				write!(f, "{{{}}}", self.raw)
			}
		}
	}
}

/// The parse result for a whole specification string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordSetSpec {
	pub sub_specs: Vec<SubSpec>,
	/// At least one element was an `@file` include.
	pub has_at_file: bool,
	/// At least one element carries filters.
	pub has_filters: bool,
}

impl RecordSetSpec {
	pub fn is_empty(&self) -> bool {
		self.sub_specs.is_empty()
	}

	pub fn len(&self) -> usize {
		self.sub_specs.len()
	}
}

impl Display for RecordSetSpec {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut first = true;
		for sub in &self.sub_specs {
			if !first {
				f.write_char(',')?;
			}
			first = false;
			Display::fmt(sub, f)?;
		}
		Ok(())
	}
}
