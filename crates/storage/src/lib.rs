// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Interfaces to the bulk-storage service and the legacy-archive bridge,
//! plus the staging plan that orders unit fetches by tape location.

pub use info::{ArchiveStatus, OnlineStatus, StorageUnitInfo, TapeCloseStatus};
pub use legacy::{LegacyArchive, LegacyHandle, LegacyStat};
pub use plan::{dedupe_sunums, staging_order};
pub use service::StorageService;

pub mod info;
pub mod legacy;
pub mod plan;
pub mod service;

pub use heliodb_type::{Error, Result};
