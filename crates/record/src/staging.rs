// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Staging: bring the storage units behind a batch of records online.
//!
//! Unit ids are gathered from the records and from records reachable
//! through already-followed links carrying linked segments, deduplicated,
//! optionally sorted by tape location, and fetched in one service call.

use std::{collections::HashMap, path::PathBuf};

use heliodb_storage::{StorageUnitInfo, dedupe_sunums, staging_order};
use heliodb_type::Result;
use tracing::{debug, instrument, warn};

use crate::{
	env::Env,
	record::{RecordHandle, cache_key},
};

/// Stage the units behind `records`. Returns the unit metadata the service
/// reported, so cursor staging can cache it across chunks; `provided`
/// short-circuits the metadata lookup for already-known units.
#[instrument(level = "debug", skip_all, fields(records = records.len(), retrieve, sort))]
pub fn stage_records(
	env: &Env,
	records: &[RecordHandle],
	retrieve: bool,
	sort: bool,
	provided: Option<&HashMap<i64, StorageUnitInfo>>,
) -> Result<Vec<StorageUnitInfo>> {
	let targets = link_reachable(env, records);
	let sunums = dedupe_sunums(
		records
			.iter()
			.chain(targets.iter())
			.map(|handle| handle.read().sunum),
	);
	if sunums.is_empty() {
		return Ok(Vec::new());
	}

	let order = if sort {
		let mut known: Vec<StorageUnitInfo> = Vec::with_capacity(sunums.len());
		let mut missing: Vec<i64> = Vec::new();
		for &sunum in &sunums {
			match provided.and_then(|m| m.get(&sunum)) {
				Some(info) => known.push(info.clone()),
				None => missing.push(sunum),
			}
		}
		if !missing.is_empty() {
			known.extend(env.storage().info(&missing)?);
		}
		staging_order(&known)
	} else {
		sunums
	};

	let infos = env.storage().fetch(&order, retrieve)?;
	debug!(units = infos.len(), "staged storage units");

	let by_sunum: HashMap<i64, &StorageUnitInfo> = infos.iter().map(|i| (i.sunum, i)).collect();
	for handle in records.iter().chain(targets.iter()) {
		let mut record = handle.write();
		if record.sunum < 0 {
			continue;
		}
		let Some(info) = by_sunum.get(&record.sunum) else {
			continue;
		};
		record.suinfo = Some((*info).clone());
		if info.is_online() && !info.online_loc.is_empty() {
			record.su_dir = Some(PathBuf::from(&info.online_loc));
		} else {
			// The fetch did not place the unit online: drop the unit
			// pointer, keep the metadata.
			record.su_dir = None;
			if retrieve {
				warn!(sunum = record.sunum, "storage unit not online after retrieval");
			}
		}
	}
	Ok(infos)
}

/// Attach unit metadata without staging anything.
pub fn attach_info(
	env: &Env,
	records: &[RecordHandle],
	cached: &HashMap<i64, StorageUnitInfo>,
) -> Result<Vec<StorageUnitInfo>> {
	let sunums = dedupe_sunums(records.iter().map(|handle| handle.read().sunum));
	let missing: Vec<i64> = sunums.iter().copied().filter(|s| !cached.contains_key(s)).collect();
	let fresh = if missing.is_empty() { Vec::new() } else { env.storage().info(&missing)? };

	let mut by_sunum: HashMap<i64, &StorageUnitInfo> = cached.iter().map(|(k, v)| (*k, v)).collect();
	for info in &fresh {
		by_sunum.insert(info.sunum, info);
	}
	for handle in records {
		let mut record = handle.write();
		if let Some(info) = by_sunum.get(&record.sunum) {
			record.suinfo = Some((*info).clone());
		}
	}
	Ok(fresh)
}

/// Records reachable through already-followed links that carry at least
/// one linked segment; their units stage together with the originals.
fn link_reachable(env: &Env, records: &[RecordHandle]) -> Vec<RecordHandle> {
	let mut out = Vec::new();
	for handle in records {
		let record = handle.read();
		for (name, link) in &record.links {
			if !link.was_followed || link.recnum < 0 {
				continue;
			}
			let has_linked_segment =
				record.template.segments.values().any(|s| s.link.as_deref() == Some(name.as_str()));
			if !has_linked_segment {
				continue;
			}
			if let Some(target) = env.cache().peek(&cache_key(&link.target_series, link.recnum)) {
				out.push(target);
			}
		}
	}
	out
}
