// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

mod common;

use heliodb_core::{DbValue, EnvConfig};
use heliodb_record::{CloseAction, create_records};
use heliodb_type::{Error, HValue};

use crate::common::harness;

#[test]
fn create_and_insert_round_trip() {
	let h = harness(EnvConfig::default());
	let rs = create_records(&h.env, "aia.lev1", 2).unwrap();
	assert_eq!(rs.num_records(), 2);

	for (i, handle) in rs.records().iter().enumerate() {
		let mut rec = handle.write();
		assert!(!rec.readonly);
		rec.set_keyword("wavelnth", HValue::Int(94)).unwrap();
		rec.set_keyword("quality", HValue::Int(i as i32)).unwrap();
	}

	rs.close(CloseAction::Insert).unwrap();
	assert!(h.db.is_writable());

	let batches = h.db.prepared_batches("INSERT INTO aia.lev1");
	assert_eq!(batches.len(), 1);
	let (sql, rows) = &batches[0];
	assert!(sql.starts_with("INSERT INTO aia.lev1 (recnum, sunum, slotnum, sessionid, sessionns"));
	assert_eq!(rows.len(), 2);
	// Sequence-assigned record numbers lead each row.
	assert_eq!(rows[0][0], DbValue::Int8(1));
	assert_eq!(rows[1][0], DbValue::Int8(2));

	assert!(h.env.cache().is_empty());
}

#[test]
fn insert_on_read_only_session_fails() {
	let h = harness(EnvConfig::default());
	h.db.refuse_writes();
	assert!(matches!(create_records(&h.env, "aia.lev1", 1), Err(Error::CommitReadOnly)));
}

#[test]
fn free_discards_created_records() {
	let h = harness(EnvConfig::default());
	let rs = create_records(&h.env, "aia.lev1", 1).unwrap();
	rs.close(CloseAction::Free).unwrap();
	assert!(h.db.prepared_batches("INSERT INTO").is_empty());
	assert!(h.env.cache().is_empty());
}

#[test]
fn zero_records_rejected() {
	let h = harness(EnvConfig::default());
	assert!(matches!(create_records(&h.env, "aia.lev1", 0), Err(Error::BadRecordCount(0))));
}
