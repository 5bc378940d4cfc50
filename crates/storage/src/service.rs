// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::path::PathBuf;

use heliodb_type::Result;

use crate::StorageUnitInfo;

/// The named interface to the bulk-storage service.
///
/// Calls block; `fetch` with `retrieve = true` may block for minutes while
/// archived units come off tape. Implementations must keep the failure
/// modes distinct: a poll timeout while units are being staged is
/// [`heliodb_type::Error::StorageTryLater`] (the caller's records stay
/// usable), a dead service is [`heliodb_type::Error::QueryFailed`] (fatal).
pub trait StorageService: Send + Sync {
	/// Allocate a fresh storage unit for `series` with room for `bytes`,
	/// returning its id and writable directory.
	fn alloc(&self, series: &str, bytes: u64) -> Result<(i64, PathBuf)>;

	/// Bring the given units online and return their metadata, in request
	/// order. With `retrieve = false` the remote archive is never
	/// contacted and offline units are simply reported offline.
	fn fetch(&self, sunums: &[i64], retrieve: bool) -> Result<Vec<StorageUnitInfo>>;

	/// Metadata only; never stages anything.
	fn info(&self, sunums: &[i64]) -> Result<Vec<StorageUnitInfo>>;
}
