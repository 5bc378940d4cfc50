// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::path::PathBuf;

use heliodb_storage::{ArchiveStatus, OnlineStatus, StorageService, StorageUnitInfo};
use heliodb_type::{Error, Result};
use parking_lot::Mutex;

/// An in-memory [`StorageService`] with scripted unit tables.
#[derive(Default)]
pub struct MemoryStorage {
	units: Mutex<Vec<StorageUnitInfo>>,
	fetches: Mutex<Vec<(Vec<i64>, bool)>>,
	info_calls: Mutex<Vec<Vec<i64>>>,
	next_sunum: Mutex<i64>,
	try_later: Mutex<bool>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			next_sunum: Mutex::new(1000),
			..Default::default()
		}
	}

	pub fn add_unit(&self, info: StorageUnitInfo) -> &Self {
		self.units.lock().push(info);
		self
	}

	pub fn add_online(&self, sunum: i64, loc: &str) -> &Self {
		self.add_unit(StorageUnitInfo {
			sunum,
			online_status: OnlineStatus::Online,
			online_loc: loc.into(),
			..Default::default()
		})
	}

	pub fn add_taped(&self, sunum: i64, tape: &str, filenum: i32) -> &Self {
		self.add_unit(StorageUnitInfo {
			sunum,
			online_status: OnlineStatus::Offline,
			archive_status: ArchiveStatus::Archived,
			tape_id: tape.into(),
			tape_filenum: filenum,
			..Default::default()
		})
	}

	/// Make the next fetch report a staging poll timeout.
	pub fn defer_next_fetch(&self) -> &Self {
		*self.try_later.lock() = true;
		self
	}

	/// Every `fetch` call: requested sunums (in request order) and the
	/// retrieve flag.
	pub fn fetches(&self) -> Vec<(Vec<i64>, bool)> {
		self.fetches.lock().clone()
	}

	pub fn info_calls(&self) -> Vec<Vec<i64>> {
		self.info_calls.lock().clone()
	}

	fn lookup(&self, sunum: i64) -> StorageUnitInfo {
		self.units.lock().iter().find(|u| u.sunum == sunum).cloned().unwrap_or(StorageUnitInfo {
			sunum,
			online_status: OnlineStatus::Invalid,
			..Default::default()
		})
	}
}

impl StorageService for MemoryStorage {
	fn alloc(&self, series: &str, bytes: u64) -> Result<(i64, PathBuf)> {
		let mut next = self.next_sunum.lock();
		*next += 1;
		let sunum = *next;
		let dir = PathBuf::from(format!("/sums/{series}/{sunum}"));
		self.units.lock().push(StorageUnitInfo {
			sunum,
			owning_series: series.to_string(),
			online_status: OnlineStatus::Online,
			online_loc: dir.display().to_string(),
			bytes,
			..Default::default()
		});
		Ok((sunum, dir))
	}

	fn fetch(&self, sunums: &[i64], retrieve: bool) -> Result<Vec<StorageUnitInfo>> {
		self.fetches.lock().push((sunums.to_vec(), retrieve));
		if std::mem::take(&mut *self.try_later.lock()) {
			return Err(Error::StorageTryLater);
		}
		let mut out = Vec::with_capacity(sunums.len());
		for &sunum in sunums {
			let mut info = self.lookup(sunum);
			if retrieve && info.is_offline_on_tape() {
				info.online_status = OnlineStatus::Online;
				info.online_loc = format!("/sums/restored/{sunum}");
				if let Some(unit) = self.units.lock().iter_mut().find(|u| u.sunum == sunum) {
					unit.online_status = OnlineStatus::Online;
					unit.online_loc = info.online_loc.clone();
				}
			}
			out.push(info);
		}
		Ok(out)
	}

	fn info(&self, sunums: &[i64]) -> Result<Vec<StorageUnitInfo>> {
		self.info_calls.lock().push(sunums.to_vec());
		Ok(sunums.iter().map(|&s| self.lookup(s)).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fetch_without_retrieve_leaves_units_offline() {
		let storage = MemoryStorage::new();
		storage.add_taped(7, "TAPE-X", 3);
		let infos = storage.fetch(&[7], false).unwrap();
		assert_eq!(infos[0].online_status, OnlineStatus::Offline);
		let infos = storage.fetch(&[7], true).unwrap();
		assert_eq!(infos[0].online_status, OnlineStatus::Online);
	}

	#[test]
	fn test_unknown_units_are_invalid() {
		let storage = MemoryStorage::new();
		let infos = storage.fetch(&[42], true).unwrap();
		assert_eq!(infos[0].online_status, OnlineStatus::Invalid);
	}

	#[test]
	fn test_deferred_fetch() {
		let storage = MemoryStorage::new();
		storage.add_online(1, "/sums/1").defer_next_fetch();
		assert!(matches!(storage.fetch(&[1], true), Err(Error::StorageTryLater)));
		assert!(storage.fetch(&[1], true).is_ok());
	}
}
