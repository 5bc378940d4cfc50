// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use heliodb_type::{HType, HValue, Result};
use serde::{Deserialize, Serialize};

/// Keyword flag word as stored in the catalog: the low 16 bits carry flag
/// bits, the high 16 bits carry the keyword rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KwFlags(pub u32);

impl KwFlags {
	pub const PER_SEGMENT: u32 = 0x1;
	pub const EXTERNAL_PRIME: u32 = 0x2;
	pub const IMPLICIT: u32 = 0x4;

	pub fn rank(&self) -> usize {
		(self.0 >> 16) as usize
	}

	pub fn per_segment(&self) -> bool {
		self.0 & Self::PER_SEGMENT != 0
	}

	pub fn external_prime(&self) -> bool {
		self.0 & Self::EXTERNAL_PRIME != 0
	}

	pub fn implicit(&self) -> bool {
		self.0 & Self::IMPLICIT != 0
	}
}

/// Template definition of one keyword of a series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeywordDef {
	pub name: String,
	/// Insertion ordering within the series; fixes the wire column order.
	pub rank: usize,
	pub ty: HType,
	pub format: String,
	pub unit: String,
	pub description: String,
	/// Value a new record starts with; also the value of constants.
	pub default: HValue,
	pub is_constant: bool,
	/// Member of the internal primary index.
	pub is_prime: bool,
	/// Member of the user-visible primary index (slotted keys translate).
	pub is_external_prime: bool,
	pub per_segment: bool,
	/// Set when the keyword's value is inherited through this link.
	pub link: Option<String>,
	/// Keyword name in the link's target series.
	pub target_key: Option<String>,
}

impl KeywordDef {
	pub fn is_linked(&self) -> bool {
		self.link.is_some()
	}

	/// Whether the keyword occupies a column in the series table and in
	/// binary results. Linked and constant keywords do not.
	pub fn has_column(&self) -> bool {
		!self.is_linked() && !self.is_constant
	}

	/// A slotted prime keyword's index companion is named `<base>_index`.
	pub fn slot_base(&self) -> Option<&str> {
		self.name.strip_suffix("_index")
	}
}

/// Parse the catalog's packed flag word.
pub fn decode_flags(persegment: i64) -> Result<KwFlags> {
	if !(0..=u32::MAX as i64).contains(&persegment) {
		return Err(heliodb_type::Error::Range(format!("keyword flag word {persegment}")));
	}
	Ok(KwFlags(persegment as u32))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flag_word_packs_rank() {
		let flags = decode_flags((7 << 16) | 0x3).unwrap();
		assert_eq!(flags.rank(), 7);
		assert!(flags.per_segment());
		assert!(flags.external_prime());
		assert!(!flags.implicit());
	}

	#[test]
	fn test_flag_word_range() {
		assert!(decode_flags(-1).is_err());
		assert!(decode_flags(u32::MAX as i64 + 1).is_err());
	}

	#[test]
	fn test_slot_base() {
		let mut def = KeywordDef {
			name: "t_obs_index".into(),
			rank: 0,
			ty: HType::LongLong,
			format: "%lld".into(),
			unit: "none".into(),
			description: String::new(),
			default: HType::LongLong.missing(),
			is_constant: false,
			is_prime: true,
			is_external_prime: false,
			per_segment: false,
			link: None,
			target_key: None,
		};
		assert_eq!(def.slot_base(), Some("t_obs"));
		def.name = "t_obs".into();
		assert_eq!(def.slot_base(), None);
	}
}
