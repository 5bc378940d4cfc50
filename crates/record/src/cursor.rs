// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Chunked record delivery over server-side cursors.
//!
//! One `NO SCROLL` cursor per sub-spec; chunks are filled across sub-specs
//! in order, and staging or metadata requests recorded on the cursor run
//! against each freshly fetched chunk.

use std::collections::HashMap;

use heliodb_storage::StorageUnitInfo;
use heliodb_type::{Error, Result};
use tracing::{debug, instrument, warn};

use crate::{
	env::Env,
	materialize::{MaterializeOptions, populate_rows},
	record::RecordHandle,
	staging,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorSeek {
	/// Open the first chunk; valid only before any chunk was opened.
	First,
	Next,
	/// Recognized but rejected: cross-chunk repositioning is not
	/// supported.
	Absolute(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkStatus {
	/// More records follow in this chunk.
	None,
	/// Last record of a chunk; the next fetch crosses a chunk boundary.
	LastInChunk,
	/// Last record of a plain (non-cursor) set.
	LastInRecordSet,
	/// The known-final record, or no record at all.
	NoMoreRecs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StagingMode {
	#[default]
	None,
	Plain,
	Sorted,
}

struct CursorSub {
	name: String,
	series: String,
	all_versions: bool,
	seglist: Vec<String>,
	exhausted: bool,
}

pub struct Cursor {
	subs: Vec<CursorSub>,
	chunk_size: usize,
	current_chunk: i64,
	/// Position within the chunk; -1 before the first record.
	current_rec: i64,
	/// Index of the final record within the chunk once known; -1 until
	/// the last chunk is identified.
	last_rec: i64,
	staging: StagingMode,
	retrieve: bool,
	want_info: bool,
	/// Unit metadata accumulated across chunks.
	suinfo: HashMap<i64, StorageUnitInfo>,
	chunk: Vec<RecordHandle>,
	active: usize,
	opened: bool,
}

impl Cursor {
	pub(crate) fn new(
		subs: Vec<(String, String, bool, Vec<String>)>,
		chunk_size: usize,
	) -> Self {
		Self {
			subs: subs
				.into_iter()
				.map(|(name, series, all_versions, seglist)| CursorSub {
					name,
					series,
					all_versions,
					seglist,
					exhausted: false,
				})
				.collect(),
			chunk_size,
			current_chunk: -1,
			current_rec: -1,
			last_rec: -1,
			staging: StagingMode::None,
			retrieve: false,
			want_info: false,
			suinfo: HashMap::new(),
			chunk: Vec::new(),
			active: 0,
			opened: false,
		}
	}

	pub fn chunk_size(&self) -> usize {
		self.chunk_size
	}

	pub fn current_chunk(&self) -> i64 {
		self.current_chunk
	}

	pub fn all_versions(&self, sub: usize) -> Option<bool> {
		self.subs.get(sub).map(|s| s.all_versions)
	}

	/// Stage each future chunk as it is fetched.
	pub fn request_staging(&mut self, retrieve: bool, sort: bool) {
		self.staging = if sort { StagingMode::Sorted } else { StagingMode::Plain };
		self.retrieve = retrieve;
	}

	/// Attach unit metadata to each future chunk as it is fetched.
	pub fn request_info(&mut self) {
		self.want_info = true;
	}

	fn all_exhausted(&self) -> bool {
		self.subs.iter().all(|s| s.exhausted)
	}

	/// Fetch the next chunk, filling across sub-spec cursors in order.
	#[instrument(level = "debug", skip(self, env))]
	pub fn open_chunk(&mut self, env: &Env, seek: CursorSeek) -> Result<usize> {
		match seek {
			CursorSeek::First if !self.opened => {}
			CursorSeek::Next => {}
			_ => return Err(Error::InvalidAction),
		}
		self.close_chunk(env);
		self.last_rec = -1;

		let mut fetched = 0usize;
		while fetched < self.chunk_size && self.active < self.subs.len() {
			if self.subs[self.active].exhausted {
				self.active += 1;
				continue;
			}
			let need = self.chunk_size - fetched;
			let sub = &self.subs[self.active];
			let sql = format!("FETCH FORWARD {need} FROM {}", sub.name);
			let result = env.db().query_bin(&sql)?;
			let rows = result.num_rows;
			if rows > 0 {
				let template = env.template(&sub.series)?;
				let goodsegs =
					(!sub.seglist.is_empty()).then(|| sub.seglist.clone());
				let opts = MaterializeOptions {
					goodsegs: goodsegs.as_deref(),
					..Default::default()
				};
				let (records, _) = populate_rows(env, &template, &result, opts)?;
				fetched += records.len();
				self.chunk.extend(records);
			}
			if rows < need {
				self.subs[self.active].exhausted = true;
				self.active += 1;
			}
		}

		self.opened = true;
		self.current_chunk += 1;
		self.current_rec = -1;

		if fetched == 0 {
			// Nothing left anywhere: park the indices at the end so
			// every later fetch reports no more records.
			self.last_rec = self.chunk_size as i64 - 1;
			self.current_rec = self.chunk_size as i64 - 1;
			return Ok(0);
		}
		if self.all_exhausted() {
			self.last_rec = fetched as i64 - 1;
		}

		if self.staging != StagingMode::None {
			let infos = staging::stage_records(
				env,
				&self.chunk,
				self.retrieve,
				self.staging == StagingMode::Sorted,
				Some(&self.suinfo),
			)?;
			for info in infos {
				self.suinfo.insert(info.sunum, info);
			}
		} else if self.want_info {
			let infos = staging::attach_info(env, &self.chunk, &self.suinfo)?;
			for info in infos {
				self.suinfo.insert(info.sunum, info);
			}
		}

		debug!(chunk = self.current_chunk, records = fetched, "opened cursor chunk");
		Ok(fetched)
	}

	/// Release the current chunk's records and reset the in-chunk index.
	pub fn close_chunk(&mut self, env: &Env) {
		for handle in self.chunk.drain(..) {
			let key = handle.read().key();
			if let Err(err) = env.cache().release(&key) {
				warn!(key = %key, %err, "chunk record release failed");
			}
		}
		self.current_rec = -1;
	}

	/// Advance to the next record, opening chunks as needed.
	pub fn fetch_next(&mut self, env: &Env) -> Result<(Option<RecordHandle>, ChunkStatus)> {
		let mut next = self.current_rec + 1;
		if !self.opened || next as usize >= self.chunk.len() {
			if self.opened && self.all_exhausted() {
				return Ok((None, ChunkStatus::NoMoreRecs));
			}
			let seek = if self.opened { CursorSeek::Next } else { CursorSeek::First };
			if self.open_chunk(env, seek)? == 0 {
				return Ok((None, ChunkStatus::NoMoreRecs));
			}
			next = 0;
		}

		self.current_rec = next;
		let record = self.chunk[next as usize].clone();
		let status = if next == self.last_rec {
			ChunkStatus::NoMoreRecs
		} else if next as usize + 1 == self.chunk_size {
			ChunkStatus::LastInChunk
		} else {
			ChunkStatus::None
		};
		Ok((Some(record), status))
	}

	/// Close every server-side cursor and release the chunk; driven by
	/// the owning record set's close.
	pub(crate) fn close(&mut self, env: &Env) {
		self.close_chunk(env);
		for sub in &self.subs {
			if let Err(err) = env.db().dms(&format!("CLOSE {}", sub.name)) {
				warn!(cursor = %sub.name, %err, "cursor close failed");
			}
		}
	}
}
