// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

mod common;

use heliodb_core::{DbValue, EnvConfig};
use heliodb_record::{ChunkStatus, CloseAction, RsStatus, count_records, list_fields, open_records};
use heliodb_testing::{bin_result, txt_result};
use heliodb_type::{Error, HValue};

use crate::common::{harness, lev1_columns, lev1_row};

#[test]
fn empty_spec_yields_empty_set() {
	let h = harness(EnvConfig::default());
	let rs = open_records(&h.env, "").unwrap();
	assert_eq!(rs.num_records(), 0);
	assert!(rs.sub_specs.is_empty());
	assert_eq!(rs.status, RsStatus::Complete);
}

#[test]
fn open_materializes_and_caches() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"FROM aia.lev1",
		bin_result(&lev1_columns(), vec![lev1_row(1, 700, 94), lev1_row(2, 701, 171)]),
	);

	let rs = open_records(&h.env, "aia.lev1").unwrap();
	assert_eq!(rs.num_records(), 2);
	assert!(rs.starts_are_monotone());
	assert_eq!(rs.sub_specs[0].start, 0);

	{
		let rec = rs.record(0).unwrap().read();
		assert_eq!(rec.recnum, 1);
		assert_eq!(rec.sunum, 700);
		assert!(rec.readonly);
		assert_eq!(rec.keyword("wavelnth").unwrap(), &HValue::Int(94));
		assert_eq!(rec.keyword("camera").unwrap(), &HValue::String("side_a".into()));
		assert_eq!(rec.segment("image").unwrap().file, "image.fits");
		// VarDim axis comes from the row, not the template.
		assert_eq!(rec.segment("spikes").unwrap().axis, vec![17]);
	}

	assert_eq!(h.env.cache().refcount("aia.lev1:1"), Some(1));
	rs.close(CloseAction::Free).unwrap();
	assert!(h.env.cache().is_empty());
}

#[test]
fn reopening_shares_cached_records() {
	let h = harness(EnvConfig::default());
	h.db.on_bin("FROM aia.lev1", bin_result(&lev1_columns(), vec![lev1_row(1, 700, 94)]));

	let rs1 = open_records(&h.env, "aia.lev1").unwrap();
	let rs2 = open_records(&h.env, "aia.lev1").unwrap();
	assert_eq!(h.env.cache().refcount("aia.lev1:1"), Some(2));

	rs1.close(CloseAction::Free).unwrap();
	assert_eq!(h.env.cache().refcount("aia.lev1:1"), Some(1));
	rs2.close(CloseAction::Free).unwrap();
	assert!(h.env.cache().is_empty());
}

#[test]
fn zero_rows_yield_minus_one_start() {
	let h = harness(EnvConfig::default());
	let rs = open_records(&h.env, "aia.lev1[wavelnth=9999]").unwrap();
	assert_eq!(rs.num_records(), 0);
	assert_eq!(rs.sub_specs.len(), 1);
	assert_eq!(rs.sub_specs[0].start, -1);
	assert_eq!(rs.status, RsStatus::Complete);
}

#[test]
fn limit_hit_reports_truncation() {
	// Budget sized for exactly two estimated rows.
	let mut config = EnvConfig::default();
	let row_bytes = heliodb_testing::fixtures::lev1_template().estimated_row_bytes();
	config.query_mem_budget = row_bytes * 2;

	let h = harness(config);
	h.db.on_bin(
		"FROM aia.lev1",
		bin_result(&lev1_columns(), vec![lev1_row(1, -1, 94), lev1_row(2, -1, 171)]),
	);
	let rs = open_records(&h.env, "aia.lev1").unwrap();
	assert_eq!(rs.num_records(), 2);
	assert_eq!(rs.status, RsStatus::Truncated);
}

#[test]
fn plain_fetch_next_walks_in_order() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"FROM aia.lev1",
		bin_result(&lev1_columns(), vec![lev1_row(1, -1, 94), lev1_row(2, -1, 171)]),
	);
	let mut rs = open_records(&h.env, "aia.lev1").unwrap();

	let (rec, status) = rs.fetch_next().unwrap();
	assert_eq!(rec.unwrap().read().recnum, 1);
	assert_eq!(status, ChunkStatus::None);
	assert_eq!(rs.sub_specs[0].current, 0);

	let (rec, status) = rs.fetch_next().unwrap();
	assert_eq!(rec.unwrap().read().recnum, 2);
	assert_eq!(status, ChunkStatus::LastInRecordSet);

	let (rec, status) = rs.fetch_next().unwrap();
	assert!(rec.is_none());
	assert_eq!(status, ChunkStatus::NoMoreRecs);
}

#[test]
fn shadow_count_uses_summary_table() {
	let h = harness(EnvConfig::default());
	// The probe finds the shadow table, so the count routes through it.
	h.db.on_txt("pg_tables", txt_result(&["tablename"], vec![vec!["lev1_shadow"]]));
	h.db.on_bin(
		"count(*) FROM aia.lev1_shadow",
		bin_result(&[("count", heliodb_core::DbType::Int8)], vec![vec![DbValue::Int8(12)]]),
	);

	let total = count_records(&h.env, "aia.lev1[wavelnth=94]").unwrap();
	assert_eq!(total, 12);

	let counts = h.db.statements_matching("count(*)");
	assert_eq!(counts.len(), 1);
	assert!(counts[0].contains("aia.lev1_shadow"));
	assert!(!counts[0].contains("GROUP BY"));
}

#[test]
fn multi_sub_spec_counts_sum() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"count(*)",
		bin_result(&[("count", heliodb_core::DbType::Int8)], vec![vec![DbValue::Int8(5)]]),
	);
	// Both sub-specs resolve against the same scripted response.
	let total = count_records(&h.env, "aia.lev1, cal.dark").unwrap();
	assert_eq!(total, 10);
}

#[test]
fn partial_records_bypass_cache() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"SELECT recnum, quality FROM aia.lev1",
		bin_result(
			&[("recnum", heliodb_core::DbType::Int8), ("quality", heliodb_core::DbType::Int4)],
			vec![vec![DbValue::Int8(1), DbValue::Int4(7)]],
		),
	);
	let rs =
		heliodb_record::open_partial_records(&h.env, "aia.lev1[!1=1!]", &["quality".into()]).unwrap();
	assert_eq!(rs.num_records(), 1);
	{
		let rec = rs.record(0).unwrap().read();
		assert!(rec.partial);
		assert_eq!(rec.keyword("quality").unwrap(), &HValue::Int(7));
		// Unrequested keywords keep template defaults.
		assert!(rec.keyword("wavelnth").unwrap().is_missing());
	}
	assert!(h.env.cache().is_empty());
	rs.close(CloseAction::Free).unwrap();
}

#[test]
fn field_list_returns_raw_result() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"SELECT DISTINCT wavelnth FROM aia.lev1",
		bin_result(&[("wavelnth", heliodb_core::DbType::Int4)], vec![
			vec![DbValue::Int4(94)],
			vec![DbValue::Int4(171)],
		]),
	);
	let res = list_fields(&h.env, "aia.lev1[!1=1!]", &["wavelnth".into()], true).unwrap();
	assert_eq!(res.num_rows, 2);

	assert!(list_fields(&h.env, "aia.lev1, cal.dark", &["wavelnth".into()], true).is_err());
}

#[test]
fn legacy_specs_need_support() {
	let h = harness(EnvConfig::default());
	for spec in ["{dsid.12345}", "{prog:mdi_fd}", "/data/plain.fits"] {
		assert!(matches!(open_records(&h.env, spec), Err(Error::NoLegacySupport)), "{spec}");
	}

	// With allow_dsds but no adapter, braced specs still fail; plain
	// files pass through as empty sub-specs.
	let mut config = EnvConfig::default();
	config.allow_dsds = true;
	let h = harness(config);
	assert!(matches!(open_records(&h.env, "{dsid.12345}"), Err(Error::NoLegacySupport)));
	let rs = open_records(&h.env, "/data/plain.fits").unwrap();
	assert_eq!(rs.num_records(), 0);
	assert_eq!(rs.sub_specs.len(), 1);
}

#[test]
fn unknown_series_frees_partial_set() {
	let h = harness(EnvConfig::default());
	h.db.on_bin("FROM aia.lev1", bin_result(&lev1_columns(), vec![lev1_row(1, -1, 94)]));
	// First sub-spec materializes, second fails; the partial set must
	// release its records.
	let result = open_records(&h.env, "aia.lev1, no.such_series");
	assert!(matches!(result, Err(Error::UnknownSeries(_))));
	assert!(h.env.cache().is_empty());
}
