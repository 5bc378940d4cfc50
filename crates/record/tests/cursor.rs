// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

mod common;

use heliodb_core::{DbValue, EnvConfig};
use heliodb_record::{ChunkStatus, CloseAction, open_cursor, open_records};
use heliodb_testing::bin_result;

use crate::common::{harness, lev1_columns, lev1_row};

fn rows(range: std::ops::RangeInclusive<i64>) -> Vec<Vec<DbValue>> {
	range.map(|i| lev1_row(i, -1, 94)).collect()
}

/// 300 records through a 128-record chunk cursor: chunks of 128, 128, 44;
/// the 300th fetch reports no more records, the 301st returns nothing.
#[test]
fn cursor_iterates_in_chunks() {
	let h = harness(EnvConfig::default());
	h.db.on_bin("FETCH FORWARD 128", bin_result(&lev1_columns(), rows(1..=128)));
	h.db.on_bin("FETCH FORWARD 128", bin_result(&lev1_columns(), rows(129..=256)));
	h.db.on_bin("FETCH FORWARD 128", bin_result(&lev1_columns(), rows(257..=300)));

	let mut rs = open_cursor(&h.env, "aia.lev1").unwrap();
	assert_eq!(rs.num_records(), 0);
	assert_eq!(h.db.statements_matching("DECLARE helio_cur_").len(), 1);

	for i in 1..=299 {
		let (rec, status) = rs.fetch_next().unwrap();
		assert_eq!(rec.expect("record").read().recnum, i);
		match i {
			128 | 256 => assert_eq!(status, ChunkStatus::LastInChunk, "call {i}"),
			_ => assert_eq!(status, ChunkStatus::None, "call {i}"),
		}
	}

	let (rec, status) = rs.fetch_next().unwrap();
	assert_eq!(rec.expect("record 300").read().recnum, 300);
	assert_eq!(status, ChunkStatus::NoMoreRecs);

	let (rec, status) = rs.fetch_next().unwrap();
	assert!(rec.is_none());
	assert_eq!(status, ChunkStatus::NoMoreRecs);

	// Chunk boundaries released earlier chunks: only the final chunk's
	// records remain cached.
	assert_eq!(h.env.cache().refcount("aia.lev1:1"), None);
	assert_eq!(h.env.cache().refcount("aia.lev1:300"), Some(1));

	rs.close(CloseAction::Free).unwrap();
	assert!(h.env.cache().is_empty());
	assert_eq!(h.db.statements_matching("CLOSE helio_cur_").len(), 1);
}

/// Chunk size 1 delivers exactly what a plain open delivers, record for
/// record.
#[test]
fn chunk_size_one_matches_plain_open() {
	let mut config = EnvConfig::default();
	config.chunk_size = 1;
	let h = harness(config);

	h.db.on_bin("FROM aia.lev1", bin_result(&lev1_columns(), rows(1..=3)));
	let plain = open_records(&h.env, "aia.lev1").unwrap();
	let expected: Vec<i64> = plain.records().iter().map(|r| r.read().recnum).collect();
	plain.close(CloseAction::Free).unwrap();

	for i in 1..=3 {
		h.db.on_bin("FETCH FORWARD 1", bin_result(&lev1_columns(), rows(i..=i)));
	}
	h.db.on_bin("FETCH FORWARD 1", bin_result(&lev1_columns(), vec![]));

	let mut rs = open_cursor(&h.env, "aia.lev1").unwrap();
	let mut got = Vec::new();
	while let (Some(rec), _) = rs.fetch_next().unwrap() {
		got.push(rec.read().recnum);
	}
	assert_eq!(got, expected);
	rs.close(CloseAction::Free).unwrap();
}

/// Cross-chunk repositioning is not supported: Absolute seeks and a
/// second First are rejected.
#[test]
fn absolute_and_repeated_first_seeks_rejected() {
	use heliodb_record::CursorSeek;

	let h = harness(EnvConfig::default());
	h.db.on_bin("FETCH FORWARD 128", bin_result(&lev1_columns(), rows(1..=1)));

	let mut rs = open_cursor(&h.env, "aia.lev1").unwrap();
	let env = rs.env().clone();
	let cursor = rs.cursor_mut().unwrap();
	assert!(matches!(
		cursor.open_chunk(&env, CursorSeek::Absolute(3)),
		Err(heliodb_type::Error::InvalidAction)
	));
	cursor.open_chunk(&env, CursorSeek::First).unwrap();
	assert!(matches!(
		cursor.open_chunk(&env, CursorSeek::First),
		Err(heliodb_type::Error::InvalidAction)
	));
	rs.close(CloseAction::Free).unwrap();
}

/// A cursor with nothing to deliver parks immediately.
#[test]
fn empty_cursor_reports_no_more() {
	let h = harness(EnvConfig::default());
	let mut rs = open_cursor(&h.env, "aia.lev1[wavelnth=9999]").unwrap();
	let (rec, status) = rs.fetch_next().unwrap();
	assert!(rec.is_none());
	assert_eq!(status, ChunkStatus::NoMoreRecs);
	rs.close(CloseAction::Free).unwrap();
}

/// Staging requested before iteration runs against each chunk as it is
/// fetched.
#[test]
fn deferred_staging_runs_per_chunk() {
	let mut config = EnvConfig::default();
	config.chunk_size = 2;
	let h = harness(config);
	h.storage.add_online(700, "/sums/700").add_online(701, "/sums/701").add_online(702, "/sums/702");

	h.db.on_bin(
		"FETCH FORWARD 2",
		bin_result(&lev1_columns(), vec![lev1_row(1, 700, 94), lev1_row(2, 701, 94)]),
	);
	h.db.on_bin("FETCH FORWARD 2", bin_result(&lev1_columns(), vec![lev1_row(3, 702, 94)]));

	let mut rs = open_cursor(&h.env, "aia.lev1").unwrap();
	rs.stage(true, false).unwrap();
	assert!(h.storage.fetches().is_empty(), "staging must wait for the first chunk");

	let (rec, _) = rs.fetch_next().unwrap();
	let rec = rec.unwrap();
	assert_eq!(rec.read().su_dir.as_deref(), Some(std::path::Path::new("/sums/700")));
	assert_eq!(h.storage.fetches().len(), 1);
	assert_eq!(h.storage.fetches()[0].0, vec![700, 701]);

	rs.fetch_next().unwrap();
	let (rec, _) = rs.fetch_next().unwrap();
	assert_eq!(rec.unwrap().read().recnum, 3);
	assert_eq!(h.storage.fetches().len(), 2);

	rs.close(CloseAction::Free).unwrap();
}
