// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Staging order for batched unit retrieval.
//!
//! Units already online (or unknown to the service) come first in sunum
//! order; offline archived units follow grouped by tape so one pass over
//! each tape services all of its units in file order.

use std::collections::HashSet;

use crate::StorageUnitInfo;

/// Deduplicate unit ids, dropping the -1 "no unit" sentinel, preserving
/// first-seen order.
pub fn dedupe_sunums(sunums: impl IntoIterator<Item = i64>) -> Vec<i64> {
	let mut seen = HashSet::new();
	sunums.into_iter().filter(|s| *s >= 0 && seen.insert(*s)).collect()
}

/// Order units for one batched fetch.
pub fn staging_order(units: &[StorageUnitInfo]) -> Vec<i64> {
	let mut sorted: Vec<&StorageUnitInfo> = units.iter().collect();
	sorted.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
	sorted.iter().map(|u| u.sunum).collect()
}

type Key<'a> = (bool, &'a str, i32, i64);

/// (on-tape, tape id, file number, sunum): online and invalid units sort
/// first by ascending sunum, tape units after by tape position.
fn sort_key(unit: &StorageUnitInfo) -> Key<'_> {
	if unit.is_offline_on_tape() {
		(true, unit.tape_id.as_str(), unit.tape_filenum, unit.sunum)
	} else {
		(false, "", 0, unit.sunum)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ArchiveStatus, OnlineStatus};

	fn online(sunum: i64) -> StorageUnitInfo {
		StorageUnitInfo {
			sunum,
			online_status: OnlineStatus::Online,
			..Default::default()
		}
	}

	fn taped(sunum: i64, tape: &str, filenum: i32) -> StorageUnitInfo {
		StorageUnitInfo {
			sunum,
			online_status: OnlineStatus::Offline,
			archive_status: ArchiveStatus::Archived,
			tape_id: tape.into(),
			tape_filenum: filenum,
			..Default::default()
		}
	}

	/// Ten units, three online and seven offline across two tapes.
	#[test]
	fn test_staging_sort() {
		let units = vec![
			taped(107, "TAPE-Y", 5),
			online(31),
			taped(101, "TAPE-X", 12),
			taped(104, "TAPE-Y", 5),
			online(12),
			taped(102, "TAPE-X", 3),
			taped(106, "TAPE-Y", 9),
			online(77),
			taped(103, "TAPE-X", 27),
			taped(105, "TAPE-Y", 1),
		];
		let order = staging_order(&units);
		assert_eq!(order, vec![12, 31, 77, 102, 101, 103, 105, 104, 107, 106]);
	}

	/// Units the service has no record of stage with the online group.
	#[test]
	fn test_invalid_units_sort_first() {
		let mut unknown = StorageUnitInfo::default();
		unknown.sunum = 5;
		assert_eq!(unknown.online_status, OnlineStatus::Invalid);
		let units = vec![taped(1, "T", 1), unknown, online(3)];
		assert_eq!(staging_order(&units), vec![3, 5, 1]);
	}

	#[test]
	fn test_dedupe_drops_sentinels_and_repeats() {
		assert_eq!(dedupe_sunums([5, -1, 3, 5, 3, 9]), vec![5, 3, 9]);
	}
}
