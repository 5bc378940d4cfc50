// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use heliodb_type::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hard ceiling on the cursor chunk size.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Per-process configuration of the record-set engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
	/// Memory budget in bytes used to derive the LIMIT of synthesized
	/// selections.
	pub query_mem_budget: usize,

	/// Permit creation of missing shadow tables when a query would
	/// otherwise require a table-wide group-by.
	pub create_shadows: bool,

	/// Records fetched per cursor chunk.
	pub chunk_size: usize,

	/// Log every synthesized statement.
	pub verbose: bool,

	/// Permit legacy-archive and plain-file sub-specs.
	pub allow_dsds: bool,
}

impl Default for EnvConfig {
	fn default() -> Self {
		Self {
			query_mem_budget: 512 << 20,
			create_shadows: false,
			chunk_size: 128,
			verbose: false,
			allow_dsds: false,
		}
	}
}

impl EnvConfig {
	pub fn validate(&self) -> Result<()> {
		if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
			return Err(Error::BadChunkSize(self.chunk_size as i64));
		}
		if self.query_mem_budget == 0 {
			return Err(Error::InvalidData("query_mem_budget must be positive".into()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_valid() {
		assert!(EnvConfig::default().validate().is_ok());
		assert_eq!(EnvConfig::default().chunk_size, 128);
	}

	#[test]
	fn test_chunk_size_bounds() {
		let mut config = EnvConfig::default();
		config.chunk_size = 0;
		assert!(matches!(config.validate(), Err(Error::BadChunkSize(0))));
		config.chunk_size = MAX_CHUNK_SIZE + 1;
		assert!(config.validate().is_err());
		config.chunk_size = MAX_CHUNK_SIZE;
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_deserialize_partial() {
		let config: EnvConfig = serde_json::from_str(r#"{"chunk_size": 64, "verbose": true}"#).unwrap();
		assert_eq!(config.chunk_size, 64);
		assert!(config.verbose);
		assert!(!config.create_shadows);
	}
}
