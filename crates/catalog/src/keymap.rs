// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Bidirectional maps between internal keyword names and the external
//! (FITS-style) names used when records are exported.
//!
//! Beyond user-supplied map files, a small set of mapping classes ships
//! built in; class tables are materialized lazily into a process-wide
//! container.

use std::{collections::HashMap, fmt::Display, fs, path::Path};

use heliodb_type::{Error, Result};
use once_cell::sync::Lazy;

/// Built-in mapping classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyMapClass {
	Dsds,
	Local,
	Ssw,
	Gng,
}

impl KeyMapClass {
	pub fn name(&self) -> &'static str {
		match self {
			KeyMapClass::Dsds => "dsds",
			KeyMapClass::Local => "local",
			KeyMapClass::Ssw => "ssw",
			KeyMapClass::Gng => "gng",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		match name.trim().to_ascii_lowercase().as_str() {
			"dsds" => Some(KeyMapClass::Dsds),
			"local" => Some(KeyMapClass::Local),
			"ssw" => Some(KeyMapClass::Ssw),
			"gng" => Some(KeyMapClass::Gng),
			_ => None,
		}
	}

	fn table(&self) -> &'static str {
		match self {
			KeyMapClass::Dsds | KeyMapClass::Local => "",
			KeyMapClass::Ssw => "BUNIT\tbunit\nBMAJ beam_major\nBMIN beam_minor\n",
			KeyMapClass::Gng => "LONPOLE\tlongitude_pole\nBUNIT\tbunit\nEQUINOX, equinox\n",
		}
	}
}

impl Display for KeyMapClass {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// One bidirectional keyword name map.
#[derive(Clone, Debug, Default)]
pub struct KeyMap {
	int2ext: HashMap<String, String>,
	ext2int: HashMap<String, String>,
}

impl KeyMap {
	/// Parse mapping text: one `external internal` pair per line, names
	/// separated by whitespace or a comma; `#` starts a comment; blank
	/// lines are skipped.
	pub fn parse_table(text: &str) -> Result<Self> {
		let mut map = KeyMap::default();
		for line in text.lines() {
			let line = line.split('#').next().unwrap_or("").trim();
			if line.is_empty() {
				continue;
			}
			let mut parts = line.splitn(2, [' ', '\t', ',']);
			let ext = parts.next().unwrap_or("").trim();
			let int = parts.next().unwrap_or("").trim();
			if ext.is_empty() || int.is_empty() {
				return Err(Error::InvalidData(format!("bad keyword mapping line '{line}'")));
			}
			map.int2ext.insert(int.to_string(), ext.to_string());
			map.ext2int.insert(ext.to_string(), int.to_string());
		}
		Ok(map)
	}

	pub fn parse_file(path: &Path) -> Result<Self> {
		let text = fs::read_to_string(path)
			.map_err(|e| Error::InvalidData(format!("cannot read keyword map {}: {e}", path.display())))?;
		Self::parse_table(&text)
	}

	pub fn len(&self) -> usize {
		self.int2ext.len()
	}

	pub fn is_empty(&self) -> bool {
		self.int2ext.is_empty()
	}

	/// External name for an internal keyword name.
	pub fn ext_name(&self, int_name: &str) -> Option<&str> {
		self.int2ext.get(int_name).map(String::as_str)
	}

	/// Internal name for an external keyword name.
	pub fn int_name(&self, ext_name: &str) -> Option<&str> {
		self.ext2int.get(ext_name).map(String::as_str)
	}
}

static CLASS_TABLES: Lazy<HashMap<KeyMapClass, KeyMap>> = Lazy::new(|| {
	[KeyMapClass::Dsds, KeyMapClass::Local, KeyMapClass::Ssw, KeyMapClass::Gng]
		.into_iter()
		.map(|class| {
			let map = KeyMap::parse_table(class.table()).expect("built-in keyword map table");
			(class, map)
		})
		.collect()
});

/// External name for an internal keyword under a mapping class.
pub fn class_ext_name(class: KeyMapClass, int_name: &str) -> Option<&'static str> {
	CLASS_TABLES.get(&class).and_then(|m| m.ext_name(int_name))
}

/// Internal name for an external keyword under a mapping class.
pub fn class_int_name(class: KeyMapClass, ext_name: &str) -> Option<&'static str> {
	CLASS_TABLES.get(&class).and_then(|m| m.int_name(ext_name))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_table_separators() {
		let map = KeyMap::parse_table("BUNIT\tbunit\nBMAJ beam_major\nEQUINOX, equinox\n").unwrap();
		assert_eq!(map.len(), 3);
		assert_eq!(map.ext_name("beam_major"), Some("BMAJ"));
		assert_eq!(map.int_name("EQUINOX"), Some("equinox"));
	}

	#[test]
	fn test_comments_and_blanks() {
		let map = KeyMap::parse_table("# header\n\nBUNIT bunit # trailing\n").unwrap();
		assert_eq!(map.len(), 1);
		assert_eq!(map.int_name("BUNIT"), Some("bunit"));
	}

	#[test]
	fn test_bad_line() {
		assert!(KeyMap::parse_table("LONESOME\n").is_err());
	}

	#[test]
	fn test_class_lookup() {
		assert_eq!(class_ext_name(KeyMapClass::Ssw, "bunit"), Some("BUNIT"));
		assert_eq!(class_int_name(KeyMapClass::Gng, "LONPOLE"), Some("longitude_pole"));
		assert_eq!(class_ext_name(KeyMapClass::Local, "anything"), None);
		assert_eq!(KeyMapClass::from_name("SSW"), Some(KeyMapClass::Ssw));
	}
}
