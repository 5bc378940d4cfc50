// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The composite result container: records from every sub-spec in order,
//! per-sub-spec bookkeeping, and the ownership discipline for closing.

use std::sync::Arc;

use heliodb_spec::SpecKind;
use heliodb_type::Result;
use tracing::warn;

use crate::{
	cursor::{ChunkStatus, Cursor},
	env::Env,
	insert,
	record::RecordHandle,
	staging,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseAction {
	/// Release every record.
	Free,
	/// Bulk-insert writable records into their series tables, then free.
	Insert,
}

/// Non-fatal annotations attached to a returned set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RsStatus {
	#[default]
	Complete,
	/// The derived LIMIT was reached; the set is a prefix of the match.
	Truncated,
	/// Storage units are still being staged; records are usable, segment
	/// files are not yet online.
	StorageTryLater,
	RemoteStorageTryLater,
}

/// Bookkeeping for one sub-spec's slice of the set.
#[derive(Clone, Debug)]
pub struct SubSpecState {
	/// Canonical text of the sub-spec, retained for cursors and replay.
	pub query: String,
	pub kind: SpecKind,
	pub all_versions: bool,
	pub seglist: Vec<String>,
	/// Index of the first record, or -1 when the sub-spec matched none.
	pub start: i64,
	/// Iteration position within the sub-spec; -1 before the first fetch.
	pub current: i64,
}

pub struct RecordSet {
	env: Arc<Env>,
	records: Vec<RecordHandle>,
	pub sub_specs: Vec<SubSpecState>,
	pub status: RsStatus,
	pub(crate) cursor: Option<Cursor>,
	/// Flat iteration position for non-cursor sets; -1 before first.
	position: i64,
	closed: bool,
}

impl RecordSet {
	pub(crate) fn new(env: Arc<Env>) -> Self {
		Self {
			env,
			records: Vec::new(),
			sub_specs: Vec::new(),
			status: RsStatus::default(),
			cursor: None,
			position: -1,
			closed: false,
		}
	}

	pub fn env(&self) -> &Arc<Env> {
		&self.env
	}

	pub fn num_records(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn records(&self) -> &[RecordHandle] {
		&self.records
	}

	pub fn record(&self, index: usize) -> Option<&RecordHandle> {
		self.records.get(index)
	}

	/// The slice of records sub-spec `i` contributed; empty when it
	/// matched nothing.
	pub fn records_of_sub_spec(&self, i: usize) -> &[RecordHandle] {
		let Some(state) = self.sub_specs.get(i) else {
			return &[];
		};
		if state.start < 0 {
			return &[];
		}
		let start = state.start as usize;
		let end = self
			.sub_specs
			.iter()
			.skip(i + 1)
			.find_map(|s| (s.start >= 0).then_some(s.start as usize))
			.unwrap_or(self.records.len());
		&self.records[start..end]
	}

	/// The cursor behind this set, when it was opened chunked.
	pub fn cursor_mut(&mut self) -> Option<&mut Cursor> {
		self.cursor.as_mut()
	}

	/// Append one sub-spec's records, fixing its start index.
	pub(crate) fn append_sub_spec(&mut self, mut state: SubSpecState, records: Vec<RecordHandle>) {
		state.start = if records.is_empty() { -1 } else { self.records.len() as i64 };
		state.current = -1;
		self.records.extend(records);
		self.sub_specs.push(state);
	}

	pub(crate) fn set_cursor(&mut self, cursor: Cursor) {
		self.cursor = Some(cursor);
	}

	/// Advance the iteration position and return the record there.
	///
	/// Cursor-backed sets fetch through their chunks; plain sets walk the
	/// composed records. The final record of a plain set reports
	/// [`ChunkStatus::LastInRecordSet`]; a cursor's known-final record
	/// reports [`ChunkStatus::NoMoreRecs`].
	pub fn fetch_next(&mut self) -> Result<(Option<RecordHandle>, ChunkStatus)> {
		if let Some(cursor) = self.cursor.as_mut() {
			return cursor.fetch_next(&self.env);
		}

		let next = self.position + 1;
		if next as usize >= self.records.len() {
			return Ok((None, ChunkStatus::NoMoreRecs));
		}
		self.position = next;
		self.note_current(next as usize);
		let status = if next as usize + 1 == self.records.len() {
			ChunkStatus::LastInRecordSet
		} else {
			ChunkStatus::None
		};
		Ok((Some(self.records[next as usize].clone()), status))
	}

	/// Update the owning sub-spec's current index for a flat position.
	fn note_current(&mut self, index: usize) {
		for state in self.sub_specs.iter_mut().rev() {
			if state.start >= 0 && state.start as usize <= index {
				state.current = index as i64 - state.start;
				return;
			}
		}
	}

	/// Stage the set's storage units. Cursor-backed sets defer to the
	/// next chunk boundary.
	pub fn stage(&mut self, retrieve: bool, sort: bool) -> Result<()> {
		if let Some(cursor) = self.cursor.as_mut() {
			cursor.request_staging(retrieve, sort);
			return Ok(());
		}
		match staging::stage_records(&self.env, &self.records, retrieve, sort, None) {
			Ok(_) => Ok(()),
			Err(err) if !err.is_fatal() => {
				self.status = match err {
					heliodb_type::Error::RemoteStorageTryLater => RsStatus::RemoteStorageTryLater,
					_ => RsStatus::StorageTryLater,
				};
				Ok(())
			}
			Err(err) => Err(err),
		}
	}

	/// Close the set. Always safe; FREE releases every record, INSERT
	/// bulk-inserts writable records first.
	pub fn close(mut self, action: CloseAction) -> Result<()> {
		if action == CloseAction::Insert {
			insert::insert_records(&self.env, &self.records)?;
		}
		self.free();
		Ok(())
	}

	fn free(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		if let Some(mut cursor) = self.cursor.take() {
			cursor.close(&self.env);
		}
		for handle in self.records.drain(..) {
			let (key, partial) = {
				let record = handle.read();
				(record.key(), record.partial)
			};
			if partial {
				continue;
			}
			if let Err(err) = self.env.cache().release(&key) {
				warn!(key = %key, %err, "record release failed during close");
			}
		}
	}

	/// Check the start-index invariant; test support.
	pub fn starts_are_monotone(&self) -> bool {
		let mut last = -1i64;
		for state in &self.sub_specs {
			if state.start < 0 {
				continue;
			}
			if state.start < last {
				return false;
			}
			last = state.start;
		}
		true
	}
}

impl Drop for RecordSet {
	fn drop(&mut self) {
		self.free();
	}
}
