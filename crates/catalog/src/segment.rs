// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use heliodb_type::{Error, HType, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegScope {
	/// One shared payload for every record.
	Constant,
	/// Per-record payload with fixed dimensions.
	Variable,
	/// Per-record payload whose dimensions vary record to record.
	VarDim,
}

impl SegScope {
	pub fn from_catalog(text: &str) -> Result<Self> {
		match text.trim().to_ascii_lowercase().as_str() {
			"constant" => Ok(SegScope::Constant),
			"variable" => Ok(SegScope::Variable),
			"vardim" => Ok(SegScope::VarDim),
			other => Err(Error::InvalidData(format!("unknown segment scope '{other}'"))),
		}
	}
}

/// Template definition of one segment of a series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentDef {
	pub name: String,
	/// Segment number; fixes the `sg_<nnn>_*` wire column names.
	pub segnum: usize,
	pub scope: SegScope,
	pub ty: HType,
	pub naxis: usize,
	/// Declared dimensions; per-record dimensions override these for
	/// [`SegScope::VarDim`] segments.
	pub axis: Vec<i32>,
	pub unit: String,
	pub protocol: String,
	pub description: String,
	/// Compression parameters adopted from `cparms_sg<nnn>` (series
	/// version ≥ 2.0).
	pub cparms: Option<String>,
	/// Per-segment scaling adopted from `<name>_bzero` / `<name>_bscale`
	/// (series version ≥ 2.1).
	pub bzero: f64,
	pub bscale: f64,
	/// Set when the segment's payload is inherited through a link.
	pub link: Option<String>,
	pub target_seg: Option<String>,
}

impl SegmentDef {
	pub fn is_linked(&self) -> bool {
		self.link.is_some()
	}

	/// Wire columns in a binary record select: the file name, plus one
	/// per axis for variable-dimension segments. Linked segments occupy
	/// no columns.
	pub fn num_wire_columns(&self) -> usize {
		if self.is_linked() {
			return 0;
		}
		match self.scope {
			SegScope::VarDim => 1 + self.naxis,
			_ => 1,
		}
	}

	/// The keyword holding this segment's compression parameters.
	pub fn cparms_keyword(&self) -> String {
		format!("cparms_sg{:03}", self.segnum)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn segment(scope: SegScope, naxis: usize, link: Option<&str>) -> SegmentDef {
		SegmentDef {
			name: "image".into(),
			segnum: 0,
			scope,
			ty: HType::Float,
			naxis,
			axis: vec![4096; naxis],
			unit: "DN".into(),
			protocol: "fits".into(),
			description: String::new(),
			cparms: None,
			bzero: 0.0,
			bscale: 1.0,
			link: link.map(Into::into),
			target_seg: None,
		}
	}

	#[test]
	fn test_wire_columns() {
		assert_eq!(segment(SegScope::Variable, 2, None).num_wire_columns(), 1);
		assert_eq!(segment(SegScope::VarDim, 2, None).num_wire_columns(), 3);
		assert_eq!(segment(SegScope::VarDim, 2, Some("lnk")).num_wire_columns(), 0);
	}

	#[test]
	fn test_cparms_keyword_name() {
		let mut seg = segment(SegScope::Variable, 2, None);
		seg.segnum = 12;
		assert_eq!(seg.cparms_keyword(), "cparms_sg012");
	}

	#[test]
	fn test_scope_from_catalog() {
		assert_eq!(SegScope::from_catalog("vardim").unwrap(), SegScope::VarDim);
		assert!(SegScope::from_catalog("scalar").is_err());
	}
}
