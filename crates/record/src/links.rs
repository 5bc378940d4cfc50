// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Link traversal in batched round trips.
//!
//! Static links already carry their target record number; they only need a
//! batched fetch. Dynamic links resolve by joining the source rows' target
//! key values against the target series through a temporary table, keeping
//! the maximum record number per key tuple (the latest version).

use std::collections::HashMap;

use heliodb_catalog::LinkKind;
use heliodb_core::{DbType, DbValue, SqlBuilder};
use heliodb_query::builder::temp_table_name;
use heliodb_type::{Error, Result};
use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::{
	env::Env,
	materialize::{MaterializeOptions, populate_rows},
	record::{RecordHandle, cache_key},
	set::{RecordSet, SubSpecState},
};

/// Rows or parameters per prepared-statement execution; the final
/// execution carries the remainder.
const PREPARED_BATCH: usize = 16;

/// Follow every unfollowed link of the set's records and return the target
/// records merged into a separate set (one sub-spec per target series).
/// The original set is not reordered; resolved links are updated in place.
#[instrument(level = "debug", skip_all, fields(records = rs.num_records()))]
pub fn resolve_links(rs: &RecordSet) -> Result<RecordSet> {
	let env = rs.env().clone();

	// Classification pass, read-only.
	let mut fetch_bags: IndexMap<String, Vec<i64>> = IndexMap::new();
	let mut static_marks: Vec<(RecordHandle, String, i64)> = Vec::new();
	let mut deferred: IndexMap<(String, String), Vec<RecordHandle>> = IndexMap::new();
	// (source handle, link name, target series) awaiting a link-ownership
	// reference once targets are materialized.
	let mut link_refs: Vec<(String, i64)> = Vec::new();

	for handle in rs.records() {
		let record = handle.read();
		for (name, link) in &record.links {
			if link.was_followed {
				if link.recnum >= 0 {
					fetch_bags
						.entry(link.target_series.clone())
						.or_default()
						.push(link.recnum);
				}
				continue;
			}
			match link.kind {
				LinkKind::Static => {
					if link.recnum >= 0 {
						fetch_bags
							.entry(link.target_series.clone())
							.or_default()
							.push(link.recnum);
						static_marks.push((handle.clone(), name.clone(), link.recnum));
						link_refs.push((link.target_series.clone(), link.recnum));
					}
				}
				LinkKind::Dynamic => {
					if link.is_set {
						deferred
							.entry((record.series.clone(), name.clone()))
							.or_default()
							.push(handle.clone());
					}
				}
			}
		}
	}

	for (handle, name, _) in &static_marks {
		handle.write().links[name.as_str()].was_followed = true;
	}

	// Joined resolution per (source series, link).
	for ((orig_series, link_name), sources) in &deferred {
		let resolved = resolve_dynamic(&env, orig_series, link_name, sources)?;
		let template = env.template(orig_series)?;
		let target_series = template.link(link_name)?.target_series.clone();
		for handle in sources {
			let recnum = handle.read().recnum;
			let target = resolved.get(&recnum).copied().unwrap_or(-1);
			{
				let mut record = handle.write();
				let link = record.links.get_mut(link_name.as_str()).expect("deferred link");
				link.was_followed = true;
				link.recnum = target;
			}
			if target >= 0 {
				fetch_bags.entry(target_series.clone()).or_default().push(target);
				link_refs.push((target_series.clone(), target));
			}
		}
	}

	// Batched target fetches, one series at a time.
	let mut merged = RecordSet::new(env.clone());
	for (series, bag) in &fetch_bags {
		let records = fetch_targets(&env, series, bag)?;
		merged.append_sub_spec(
			SubSpecState {
				query: series.clone(),
				kind: heliodb_spec::SpecKind::Drms,
				all_versions: false,
				seglist: Vec::new(),
				start: -1,
				current: -1,
			},
			records,
		);
	}

	// Followed links own one reference to their target each.
	for (series, recnum) in link_refs {
		env.cache().retain(&cache_key(&series, recnum));
	}

	Ok(merged)
}

/// Resolve one dynamic link for a batch of source records: temp table of
/// `(recnum, pk…)`, inner join against the target, max recnum per tuple.
/// Returns the target recnum per source recnum.
fn resolve_dynamic(
	env: &Env,
	orig_series: &str,
	link_name: &str,
	sources: &[RecordHandle],
) -> Result<HashMap<i64, i64>> {
	let template = env.template(orig_series)?;
	let def = template.link(link_name)?;
	if def.target_pidx_names.is_empty() {
		return Err(Error::InvalidLink(format!(
			"dynamic link {orig_series}:{link_name} has no target primary index"
		)));
	}
	let pk_list = def.target_pidx_names.join(", ");

	let t1 = temp_table_name();
	let mut sql = SqlBuilder::new();
	sql.push("CREATE TEMPORARY TABLE ").push(&t1).push(" (recnum bigint");
	for (name, ty) in def.target_pidx_names.iter().zip(&def.target_pidx_types) {
		sql.push(", ").push(name).push(" ").push(ty.sql_type());
	}
	sql.push(")");
	env.db().dms(&sql.finish())?;

	// Source tuples, array-bound in batches.
	let mut types = vec![DbType::Int8];
	types.extend(def.target_pidx_types.iter().map(|ty| DbType::from_htype(*ty)));
	let mut rows: Vec<Vec<DbValue>> = Vec::with_capacity(sources.len());
	for handle in sources {
		let record = handle.read();
		let link = record.link(link_name)?;
		if link.pidx_values.len() != def.target_pidx_names.len() {
			return Err(Error::InvalidLink(format!(
				"{orig_series}:{link_name} carries {} key values, target index has {}",
				link.pidx_values.len(),
				def.target_pidx_names.len()
			)));
		}
		let mut row = Vec::with_capacity(types.len());
		row.push(DbValue::Int8(record.recnum));
		row.extend(link.pidx_values.iter().cloned().map(DbValue::from));
		rows.push(row);
	}

	let placeholders: Vec<String> = (1..=types.len()).map(|i| format!("${i}")).collect();
	let insert_sql = format!("INSERT INTO {t1} (recnum, {pk_list}) VALUES ({})", placeholders.join(", "));
	for chunk in rows.chunks(PREPARED_BATCH) {
		env.db().execute_prepared(&insert_sql, &types, chunk)?;
	}

	let t2 = temp_table_name();
	let mut sql = SqlBuilder::new();
	sql.push("SELECT orig.recnum AS orecnum, target.recnum AS trecnum, ");
	sql.push_list(", ", def.target_pidx_names.iter().map(|n| format!("target.{n}")));
	sql.push(" INTO TEMPORARY TABLE ")
		.push(&t2)
		.push(" FROM ")
		.push(&t1)
		.push(" AS orig INNER JOIN ")
		.push(&def.target_series)
		.push(" AS target USING (")
		.push(&pk_list)
		.push(")");
	env.db().dms(&sql.finish())?;

	let mut sql = SqlBuilder::new();
	sql.push("SELECT orecnum, trecnum FROM ")
		.push(&t2)
		.push(" WHERE trecnum IN (SELECT max(trecnum) FROM ")
		.push(&t2)
		.push(" GROUP BY ")
		.push(&pk_list)
		.push(")");
	let result = env.db().query_bin(&sql.finish())?;

	let mut resolved = HashMap::with_capacity(result.num_rows);
	for row in 0..result.num_rows {
		let orecnum = result
			.value(row, 0)?
			.as_i64()
			.ok_or_else(|| Error::BadQueryResult("orecnum is not an integer".into()))?;
		let trecnum = result
			.value(row, 1)?
			.as_i64()
			.ok_or_else(|| Error::BadQueryResult("trecnum is not an integer".into()))?;
		resolved.insert(orecnum, trecnum);
	}
	debug!(link = %link_name, sources = sources.len(), resolved = resolved.len(), "dynamic link resolved");
	Ok(resolved)
}

/// Fetch one target series' records: cached targets come straight from the
/// cache, the rest through prepared `IN` selections in batches of
/// [`PREPARED_BATCH`] plus a remainder.
fn fetch_targets(env: &Env, series: &str, bag: &[i64]) -> Result<Vec<RecordHandle>> {
	let template = env.template(series)?;
	let mut seen = std::collections::HashSet::new();
	let mut wanted: Vec<i64> = Vec::new();
	let mut by_recnum: HashMap<i64, RecordHandle> = HashMap::new();
	let mut order: Vec<i64> = Vec::new();

	for &recnum in bag {
		if !seen.insert(recnum) {
			continue;
		}
		order.push(recnum);
		if let Some(handle) = env.cache().lookup(&cache_key(series, recnum)) {
			by_recnum.insert(recnum, handle);
		} else {
			wanted.push(recnum);
		}
	}

	// On failure, references acquired so far must go back before the
	// error propagates.
	let release_acquired = |by_recnum: &HashMap<i64, RecordHandle>| {
		for handle in by_recnum.values() {
			env.cache().release(&handle.read().key()).ok();
		}
	};

	let columns = template.wire_column_names().join(", ");
	for chunk in wanted.chunks(PREPARED_BATCH) {
		let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("${i}")).collect();
		let sql = format!(
			"SELECT {columns} FROM {series} WHERE recnum IN ({})",
			placeholders.join(", ")
		);
		let types = vec![DbType::Int8; chunk.len()];
		let params: Vec<DbValue> = chunk.iter().map(|&r| DbValue::Int8(r)).collect();
		let populated = env
			.db()
			.query_prepared(&sql, &types, &params)
			.and_then(|result| populate_rows(env, &template, &result, MaterializeOptions::default()));
		let (records, _) = match populated {
			Ok(populated) => populated,
			Err(err) => {
				release_acquired(&by_recnum);
				return Err(err);
			}
		};
		for handle in records {
			let recnum = handle.read().recnum;
			by_recnum.insert(recnum, handle);
		}
	}

	// A missing target yields no row; the link stays at -1 elsewhere and
	// the fetch simply returns fewer records.
	Ok(order.into_iter().filter_map(|recnum| by_recnum.remove(&recnum)).collect())
}
