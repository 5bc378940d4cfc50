// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnlineStatus {
	Online,
	Offline,
	/// The service has no valid record of the unit.
	#[default]
	Invalid,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveStatus {
	Archived,
	#[default]
	NotArchived,
	Pending,
}

/// Write status of an archive tape. File number 0 on any tape is the
/// label, so data files are numbered from 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapeCloseStatus {
	#[default]
	Uninitialized,
	Active,
	Closed,
}

/// Metadata the storage service reports for one unit; doubles as the sort
/// key for batched retrieval and as cached metadata on records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageUnitInfo {
	pub sunum: i64,
	pub owning_series: String,
	pub online_loc: String,
	pub online_status: OnlineStatus,
	pub archive_status: ArchiveStatus,
	pub tape_id: String,
	pub tape_filenum: i32,
	pub tape_group: i32,
	pub tape_close: TapeCloseStatus,
	pub creat_date: String,
	pub bytes: u64,
	pub history_comment: String,
	pub retention_status: i32,
	pub effective_date: String,
}

impl StorageUnitInfo {
	/// Whether retrieval must go through a tape drive.
	pub fn is_offline_on_tape(&self) -> bool {
		self.online_status == OnlineStatus::Offline
			&& self.archive_status == ArchiveStatus::Archived
			&& !self.tape_id.is_empty()
	}

	pub fn is_online(&self) -> bool {
		self.online_status == OnlineStatus::Online
	}
}
