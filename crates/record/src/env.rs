// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The process environment: one struct owning every piece of process-wide
//! state plus the handles to the external collaborators. Dropping it tears
//! down the shadow memo, the template catalog, and the record cache, in
//! that order.

use std::sync::Arc;

use heliodb_catalog::{SeriesTemplate, TemplateCatalog};
use heliodb_core::{DbClient, EnvConfig};
use heliodb_query::ShadowMemo;
use heliodb_storage::{LegacyArchive, StorageService};
use heliodb_type::{Error, Result};
use parking_lot::Mutex;

use crate::cache::RecordCache;

pub struct Env {
	db: Arc<dyn DbClient>,
	storage: Arc<dyn StorageService>,
	legacy: Option<Arc<dyn LegacyArchive>>,
	pub config: EnvConfig,
	catalog: TemplateCatalog,
	cache: RecordCache,
	shadow_memo: ShadowMemo,
	/// The coarse lock held across row materialization; see the cache
	/// module for the ownership discipline it protects.
	materialize_lock: Mutex<()>,
	pub session_id: i64,
	pub session_ns: String,
}

impl Env {
	pub fn new(
		db: Arc<dyn DbClient>,
		storage: Arc<dyn StorageService>,
		config: EnvConfig,
	) -> Result<Arc<Self>> {
		Self::build(db, storage, None, config)
	}

	/// As [`Env::new`], with the optional legacy-archive adapter installed.
	pub fn with_legacy(
		db: Arc<dyn DbClient>,
		storage: Arc<dyn StorageService>,
		legacy: Arc<dyn LegacyArchive>,
		config: EnvConfig,
	) -> Result<Arc<Self>> {
		Self::build(db, storage, Some(legacy), config)
	}

	fn build(
		db: Arc<dyn DbClient>,
		storage: Arc<dyn StorageService>,
		legacy: Option<Arc<dyn LegacyArchive>>,
		config: EnvConfig,
	) -> Result<Arc<Self>> {
		config.validate()?;
		Ok(Arc::new(Self {
			db,
			storage,
			legacy,
			config,
			catalog: TemplateCatalog::new(),
			cache: RecordCache::new(),
			shadow_memo: ShadowMemo::new(),
			materialize_lock: Mutex::new(()),
			session_id: -1,
			session_ns: String::new(),
		}))
	}

	pub fn db(&self) -> &dyn DbClient {
		self.db.as_ref()
	}

	pub fn storage(&self) -> &dyn StorageService {
		self.storage.as_ref()
	}

	/// The legacy bridge, or [`Error::NoLegacySupport`] when no adapter is
	/// installed.
	pub fn legacy(&self) -> Result<&dyn LegacyArchive> {
		self.legacy.as_deref().ok_or(Error::NoLegacySupport)
	}

	pub fn template(&self, series: &str) -> Result<Arc<SeriesTemplate>> {
		self.catalog.get(self.db.as_ref(), series)
	}

	pub fn catalog(&self) -> &TemplateCatalog {
		&self.catalog
	}

	pub fn cache(&self) -> &RecordCache {
		&self.cache
	}

	pub fn shadow_memo(&self) -> &ShadowMemo {
		&self.shadow_memo
	}

	/// The coarse materialization lock.
	pub fn materialize_lock(&self) -> &Mutex<()> {
		&self.materialize_lock
	}
}

impl Drop for Env {
	fn drop(&mut self) {
		self.shadow_memo.clear();
		self.catalog.clear();
		self.cache.clear();
	}
}

#[cfg(test)]
mod tests {
	use heliodb_testing::{MemoryStorage, ScriptedDb};

	use super::*;

	#[test]
	fn test_bad_config_rejected() {
		let mut config = EnvConfig::default();
		config.chunk_size = 0;
		let result = Env::new(Arc::new(ScriptedDb::new()), Arc::new(MemoryStorage::new()), config);
		assert!(result.is_err());
	}

	#[test]
	fn test_legacy_gate() {
		let env = Env::new(
			Arc::new(ScriptedDb::new()),
			Arc::new(MemoryStorage::new()),
			EnvConfig::default(),
		)
		.unwrap();
		assert!(matches!(env.legacy(), Err(Error::NoLegacySupport)));
	}
}
