// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

mod common;

use heliodb_core::{DbType, DbValue, EnvConfig};
use heliodb_record::{CloseAction, open_records, resolve_links};
use heliodb_testing::bin_result;

use crate::common::{
	dark_columns, dark_row, flat_columns, flat_row, harness, pair_columns, pair_row,
};

/// Two source records referencing the same static target: one batched
/// `IN` statement, one shared target record.
#[test]
fn static_link_batch_shares_target() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"FROM cal.pair",
		bin_result(&pair_columns(), vec![pair_row(1, 77, None), pair_row(2, 77, None)]),
	);
	h.db.on_bin("FROM cal.dark WHERE recnum IN", bin_result(&dark_columns(), vec![dark_row(77, 900)]));

	let rs = open_records(&h.env, "cal.pair").unwrap();
	let merged = resolve_links(&rs).unwrap();

	assert_eq!(merged.num_records(), 1);
	assert_eq!(merged.record(0).unwrap().read().recnum, 77);

	let in_statements = h.db.statements_matching("FROM cal.dark WHERE recnum IN");
	assert_eq!(in_statements.len(), 1);

	// Shared target: one set reference plus one per source link.
	assert!(h.env.cache().refcount("cal.dark:77").unwrap() >= 2);

	for handle in rs.records() {
		let rec = handle.read();
		let link = rec.link("sdark").unwrap();
		assert!(link.was_followed);
		assert_eq!(link.recnum, 77);
	}

	merged.close(CloseAction::Free).unwrap();
	rs.close(CloseAction::Free).unwrap();
	assert!(h.env.cache().is_empty());
}

/// Twenty dynamic sources: one temp table loaded in batches of sixteen
/// plus a remainder, joined on the target key, max recnum per tuple.
#[test]
fn dynamic_link_join_resolves_latest() {
	let h = harness(EnvConfig::default());
	let sources: Vec<Vec<DbValue>> =
		(1..=20).map(|i| pair_row(i, -1, Some((i as f64, 94)))).collect();
	h.db.on_bin("FROM cal.pair", bin_result(&pair_columns(), sources));

	// Join result: source i resolves to target 1000 + i.
	let pairs: Vec<Vec<DbValue>> =
		(1..=20).map(|i| vec![DbValue::Int8(i), DbValue::Int8(1000 + i)]).collect();
	h.db.on_bin(
		"WHERE trecnum IN (SELECT max(trecnum)",
		bin_result(&[("orecnum", DbType::Int8), ("trecnum", DbType::Int8)], pairs),
	);

	let flats: Vec<Vec<DbValue>> = (1..=16).map(|i| flat_row(1000 + i, i as f64, 94)).collect();
	h.db.on_bin("FROM cal.flat WHERE recnum IN", bin_result(&flat_columns(), flats));
	let rest: Vec<Vec<DbValue>> = (17..=20).map(|i| flat_row(1000 + i, i as f64, 94)).collect();
	h.db.on_bin("FROM cal.flat WHERE recnum IN", bin_result(&flat_columns(), rest));

	let rs = open_records(&h.env, "cal.pair").unwrap();
	let merged = resolve_links(&rs).unwrap();

	// Temp table created once, loaded 16 + 4.
	assert_eq!(h.db.statements_matching("CREATE TEMPORARY TABLE").len(), 1);
	let batches = h.db.prepared_batches("INSERT INTO helio_tmp_");
	assert_eq!(batches.len(), 2);
	assert_eq!(batches[0].1.len(), 16);
	assert_eq!(batches[1].1.len(), 4);

	let joins = h.db.statements_matching("INNER JOIN cal.flat AS target USING (t, wavelength)");
	assert_eq!(joins.len(), 1);

	assert_eq!(merged.num_records(), 20);
	for (i, handle) in rs.records().iter().enumerate() {
		let rec = handle.read();
		let link = rec.link("dflat").unwrap();
		assert!(link.was_followed);
		assert_eq!(link.recnum, 1001 + i as i64);
	}

	// Target fetches went out in two IN batches.
	assert_eq!(h.db.statements_matching("FROM cal.flat WHERE recnum IN").len(), 2);

	merged.close(CloseAction::Free).unwrap();
	rs.close(CloseAction::Free).unwrap();
	assert!(h.env.cache().is_empty());
}

/// A dynamic link with no matching target row: followed, recnum -1, no
/// error, no target fetched.
#[test]
fn link_to_missing_target() {
	let h = harness(EnvConfig::default());
	h.db.on_bin(
		"FROM cal.pair",
		bin_result(&pair_columns(), vec![pair_row(1, -1, Some((9.0, 335)))]),
	);
	// Join yields no pairs (scripted default empty result).

	let rs = open_records(&h.env, "cal.pair").unwrap();
	let merged = resolve_links(&rs).unwrap();

	assert_eq!(merged.num_records(), 0);
	let rec = rs.record(0).unwrap().read();
	let link = rec.link("dflat").unwrap();
	assert!(link.was_followed);
	assert_eq!(link.recnum, -1);
	assert!(h.db.statements_matching("FROM cal.flat WHERE recnum IN").is_empty());
	drop(rec);

	merged.close(CloseAction::Free).unwrap();
	rs.close(CloseAction::Free).unwrap();
}

/// An already-followed link short-circuits to the cached record on a
/// second resolution pass.
#[test]
fn followed_links_use_cache() {
	let h = harness(EnvConfig::default());
	h.db.on_bin("FROM cal.pair", bin_result(&pair_columns(), vec![pair_row(1, 77, None)]));
	h.db.on_bin("FROM cal.dark WHERE recnum IN", bin_result(&dark_columns(), vec![dark_row(77, 900)]));

	let rs = open_records(&h.env, "cal.pair").unwrap();
	let first = resolve_links(&rs).unwrap();
	assert_eq!(h.db.statements_matching("FROM cal.dark WHERE recnum IN").len(), 1);

	let second = resolve_links(&rs).unwrap();
	assert_eq!(second.num_records(), 1);
	// No further fetch went to the database.
	assert_eq!(h.db.statements_matching("FROM cal.dark WHERE recnum IN").len(), 1);

	second.close(CloseAction::Free).unwrap();
	first.close(CloseAction::Free).unwrap();
	rs.close(CloseAction::Free).unwrap();
	assert!(h.env.cache().is_empty());
}
