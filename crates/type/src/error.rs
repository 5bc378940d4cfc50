// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The error taxonomy surfaced to callers of the record-set engine.
//!
//! Every fatal condition maps to exactly one variant. Non-fatal conditions
//! (`QueryTruncated`, the storage deferrals) also have variants so that call
//! sites which must hard-fail can do so, but the composition layer normally
//! carries them as a [`RsStatus`]-style annotation instead of an `Err`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
	#[error("record count out of range: {0}")]
	BadRecordCount(i64),

	#[error("operations arrived out of sequence: {0}")]
	BadSequence(String),

	#[error("malformed query result: {0}")]
	BadQueryResult(String),

	#[error("query failed: {0}")]
	QueryFailed(String),

	#[error("database rejected statement: {0}")]
	BadDbQuery(String),

	#[error("out of memory")]
	OutOfMemory,

	#[error("invalid data: {0}")]
	InvalidData(String),

	#[error("invalid record-set specification: {0}")]
	InvalidSpec(String),

	#[error("invalid record {recnum} of series '{series}'")]
	InvalidRecord {
		series: String,
		recnum: i64,
	},

	#[error("invalid keyword '{0}'")]
	InvalidKeyword(String),

	#[error("invalid link '{0}'")]
	InvalidLink(String),

	#[error("unknown series '{0}'")]
	UnknownSeries(String),

	#[error("unknown record {recnum} of series '{series}'")]
	UnknownRecord {
		series: String,
		recnum: i64,
	},

	#[error("unknown link '{0}'")]
	UnknownLink(String),

	#[error("cannot create record in series '{0}'")]
	CantCreateRecord(String),

	#[error("attempt to commit a read-only record")]
	CommitReadOnly,

	#[error("invalid close action")]
	InvalidAction,

	#[error("no segment '{0}'")]
	NoSegment(String),

	#[error("legacy archive support is not available")]
	NoLegacySupport,

	#[error("legacy archive data is offline")]
	LegacyOffline,

	#[error("cannot open adapter library: {0}")]
	CantOpenLibrary(String),

	/// Non-fatal: the result hit the derived LIMIT and was cut short.
	#[error("query result truncated at limit")]
	QueryTruncated,

	#[error("storage unit must be staged before use")]
	NeedStorage,

	/// Non-fatal: the storage service accepted the request but the units
	/// are not yet online.
	#[error("storage units not yet online, retry later")]
	StorageTryLater,

	/// Non-fatal: as [`Error::StorageTryLater`], for remote archives.
	#[error("remote storage units not yet online, retry later")]
	RemoteStorageTryLater,

	#[error("chunk size {0} out of range")]
	BadChunkSize(i64),

	#[error("cannot create container")]
	CantCreateHCon,

	#[error("cannot create file '{0}'")]
	FileCreate(String),

	#[error("value out of range: {0}")]
	Range(String),

	#[error("arithmetic overflow: {0}")]
	Overflow(String),
}

impl Error {
	/// Whether the condition leaves the record-set usable.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Error::QueryTruncated | Error::StorageTryLater | Error::RemoteStorageTryLater)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fatality_partition() {
		assert!(Error::QueryFailed("x".into()).is_fatal());
		assert!(Error::UnknownSeries("hmi.m_45s".into()).is_fatal());
		assert!(!Error::QueryTruncated.is_fatal());
		assert!(!Error::StorageTryLater.is_fatal());
		assert!(!Error::RemoteStorageTryLater.is_fatal());
	}

	#[test]
	fn test_display_carries_context() {
		let err = Error::UnknownRecord {
			series: "aia.lev1".into(),
			recnum: 42,
		};
		assert_eq!(err.to_string(), "unknown record 42 of series 'aia.lev1'");
	}
}
