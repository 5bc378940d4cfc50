// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The record engine: materialization of catalog rows into cached,
//! ref-counted records, link traversal, chunked cursors, storage staging,
//! and the record-set container tying them together.

pub use cache::RecordCache;
pub use cursor::{ChunkStatus, Cursor, CursorSeek, StagingMode};
pub use env::Env;
pub use links::resolve_links;
pub use open::{
	count_records, create_records, list_fields, open_cursor, open_n_records, open_partial_records,
	open_records,
};
pub use record::{LinkInstance, Lifetime, Record, RecordHandle, SegmentInstance};
pub use set::{CloseAction, RecordSet, RsStatus, SubSpecState};
pub use staging::stage_records;

pub mod cache;
pub mod cursor;
pub mod env;
pub mod insert;
pub mod links;
pub mod materialize;
pub mod open;
pub mod record;
pub mod set;
pub mod staging;

pub use heliodb_type::{Error, Result};
