// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The process-wide record cache.
//!
//! An arena keyed by `series:recnum` with explicit acquire/release. The
//! refcount tracks logical owners (record sets and followed links); a
//! release to zero removes the slot, and removing the slot releases the
//! targets of the record's followed links in turn.

use std::collections::HashMap;

use heliodb_type::{Error, Result};
use parking_lot::Mutex;
use tracing::trace;

use crate::record::{Record, RecordHandle, cache_key};

struct CacheSlot {
	record: RecordHandle,
	refcount: u32,
}

#[derive(Default)]
pub struct RecordCache {
	slots: Mutex<HashMap<String, CacheSlot>>,
}

impl RecordCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.slots.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.lock().is_empty()
	}

	/// Drop every slot regardless of refcounts; environment teardown only.
	pub fn clear(&self) {
		self.slots.lock().clear();
	}

	/// Current refcount of a cached record.
	pub fn refcount(&self, key: &str) -> Option<u32> {
		self.slots.lock().get(key).map(|s| s.refcount)
	}

	/// Acquire the cached record, incrementing its refcount.
	pub fn lookup(&self, key: &str) -> Option<RecordHandle> {
		let mut slots = self.slots.lock();
		let slot = slots.get_mut(key)?;
		slot.refcount += 1;
		Some(slot.record.clone())
	}

	/// Peek without touching the refcount.
	pub fn peek(&self, key: &str) -> Option<RecordHandle> {
		self.slots.lock().get(key).map(|s| s.record.clone())
	}

	/// Add one reference without returning the record; a followed link
	/// taking ownership of its target does this.
	pub fn retain(&self, key: &str) -> bool {
		let mut slots = self.slots.lock();
		match slots.get_mut(key) {
			Some(slot) => {
				slot.refcount += 1;
				true
			}
			None => false,
		}
	}

	/// Acquire the cached record or insert `build()` with refcount 1.
	/// Returns the handle and whether it was already cached.
	pub fn acquire_or_insert(&self, build: impl FnOnce() -> Record) -> Result<(RecordHandle, bool)> {
		let record = build();
		if record.partial {
			return Err(Error::InvalidRecord {
				series: record.series,
				recnum: record.recnum,
			});
		}
		let key = record.key();
		let mut slots = self.slots.lock();
		if let Some(slot) = slots.get_mut(&key) {
			slot.refcount += 1;
			return Ok((slot.record.clone(), true));
		}
		let handle: RecordHandle = std::sync::Arc::new(parking_lot::RwLock::new(record));
		slots.insert(
			key,
			CacheSlot {
				record: handle.clone(),
				refcount: 1,
			},
		);
		Ok((handle, false))
	}

	/// Release one reference; at zero the slot is removed and the record's
	/// followed link targets are released as well.
	pub fn release(&self, key: &str) -> Result<()> {
		let removed = {
			let mut slots = self.slots.lock();
			let Some(slot) = slots.get_mut(key) else {
				return Err(Error::UnknownRecord {
					series: key.split(':').next().unwrap_or("").to_string(),
					recnum: key.rsplit(':').next().and_then(|r| r.parse().ok()).unwrap_or(-1),
				});
			};
			slot.refcount -= 1;
			if slot.refcount > 0 {
				return Ok(());
			}
			trace!(key = %key, "record refcount reached zero, evicting");
			slots.remove(key)
		};

		// Deep free outside the lock: drop the record's own references.
		if let Some(slot) = removed {
			let targets: Vec<String> = {
				let record = slot.record.read();
				record.links
					.values()
					.filter(|l| l.was_followed && l.recnum >= 0)
					.map(|l| cache_key(&l.target_series, l.recnum))
					.collect()
			};
			{
				let mut record = slot.record.write();
				record.keywords.clear();
				record.segments.clear();
				record.links.clear();
				record.suinfo = None;
				record.su_dir = None;
			}
			for target in targets {
				// The target may itself cascade.
				self.release(&target).ok();
			}
		}
		Ok(())
	}
}
