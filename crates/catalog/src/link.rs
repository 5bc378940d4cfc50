// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use heliodb_type::{Error, HType, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
	/// Resolves directly through a stored target record number.
	Static,
	/// Resolves by matching the target series' primary-key tuple.
	Dynamic,
}

impl LinkKind {
	pub fn from_catalog(text: &str) -> Result<Self> {
		match text.trim().to_ascii_uppercase().as_str() {
			"STATIC" => Ok(LinkKind::Static),
			"DYNAMIC" => Ok(LinkKind::Dynamic),
			other => Err(Error::InvalidLink(format!("unknown link kind '{other}'"))),
		}
	}
}

/// Template definition of one link of a series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkDef {
	pub name: String,
	pub rank: usize,
	pub kind: LinkKind,
	pub target_series: String,
	pub description: String,
	/// Primary-key names of the target series, filled when the target's
	/// template is known; dynamic links join on these.
	pub target_pidx_names: Vec<String>,
	pub target_pidx_types: Vec<HType>,
}

impl LinkDef {
	/// Wire columns this link occupies in a binary record select.
	pub fn num_wire_columns(&self) -> usize {
		match self.kind {
			LinkKind::Static => 1,
			LinkKind::Dynamic => 1 + self.target_pidx_names.len(),
		}
	}
}
