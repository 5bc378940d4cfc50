// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The shadow summary table: per primary-key tuple, the maximum record
//! number and the version count. Consulting it turns latest-version
//! selection into a plain indexed lookup.

use std::collections::HashMap;

use heliodb_catalog::{SeriesTemplate, ShadowState, split_namespace};
use heliodb_core::{DbClient, EnvConfig, SqlBuilder};
use heliodb_type::Result;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::{STATEMENT_SEPARATOR, WhereFragments};

/// `ns.table` → `ns.table_shadow`.
pub fn shadow_table_name(series: &str) -> String {
	format!("{}_shadow", series.trim().to_ascii_lowercase())
}

/// Process-wide memo of per-series shadow-table existence.
#[derive(Debug, Default)]
pub struct ShadowMemo {
	states: Mutex<HashMap<String, ShadowState>>,
}

impl ShadowMemo {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn clear(&self) {
		self.states.lock().clear();
	}

	pub fn note(&self, series: &str, state: ShadowState) {
		self.states.lock().insert(series.to_ascii_lowercase(), state);
	}

	/// Probe the catalog for the series' shadow table, caching the answer.
	#[instrument(level = "trace", skip(self, db))]
	pub fn exists(&self, db: &dyn DbClient, series: &str) -> Result<ShadowState> {
		let key = series.to_ascii_lowercase();
		if let Some(state) = self.states.lock().get(&key) {
			if *state != ShadowState::Unknown {
				return Ok(*state);
			}
		}
		let (ns, table) = split_namespace(&key)?;
		let mut sql = SqlBuilder::new();
		sql.push("SELECT tablename FROM pg_tables WHERE schemaname = '")
			.push(&ns)
			.push("' AND tablename = '")
			.push(&table)
			.push("_shadow'");
		let state = if db.query_txt(&sql.finish())?.num_rows() > 0 {
			ShadowState::Present
		} else {
			ShadowState::Absent
		};
		self.states.lock().insert(key, state);
		Ok(state)
	}
}

/// Resolve the shadow state a query should build against, creating the
/// table when configuration permits and the spec would otherwise force a
/// table-wide group-by. Creation is never triggered by specs carrying a
/// prime-key or record-number filter: the aggregation those save is small.
#[instrument(level = "debug", skip(db, memo, template, frags, config))]
pub fn ensure_shadow(
	db: &dyn DbClient,
	memo: &ShadowMemo,
	template: &SeriesTemplate,
	frags: &WhereFragments,
	config: &EnvConfig,
) -> Result<ShadowState> {
	let series = &template.info.name;
	let state = memo.exists(db, series)?;
	if state == ShadowState::Present {
		return Ok(state);
	}
	if !config.create_shadows || frags.has_pk() || frags.has_recnum() || !template.info.has_pidx() {
		return Ok(state);
	}
	create_shadow(db, template)?;
	memo.note(series, ShadowState::Present);
	Ok(ShadowState::Present)
}

fn create_shadow(db: &dyn DbClient, template: &SeriesTemplate) -> Result<()> {
	let series = &template.info.name;
	let shadow = shadow_table_name(series);
	let pk = template.info.pidx.join(", ");

	db.make_writable()?;

	let mut sql = SqlBuilder::new();
	sql.push("CREATE TABLE ")
		.push(&shadow)
		.push(" AS SELECT ")
		.push(&pk)
		.push(", max(recnum) AS recnum, count(*) AS nrecords FROM ")
		.push(series)
		.push(" GROUP BY ")
		.push(&pk);
	db.dms(&sql.finish())?;

	let (_, table) = split_namespace(series)?;
	let mut sql = SqlBuilder::new();
	sql.push("CREATE UNIQUE INDEX ")
		.push(&table)
		.push("_shadow_pkidx ON ")
		.push(&shadow)
		.push(" (")
		.push(&pk)
		.push(")");
	db.dms(&sql.finish())?;

	info!(series = %series, "created shadow table");
	Ok(())
}

/// Count of latest-version records, through the shadow table.
pub fn count_query(template: &SeriesTemplate, frags: &WhereFragments) -> String {
	let series = &template.info.name;
	let shadow = shadow_table_name(series);
	let mut sql = SqlBuilder::new();

	if frags.has_npk() {
		// SQL filters address base-table columns of the winning version.
		sql.push("SELECT count(*) FROM ")
			.push(series)
			.push(", ")
			.push(&shadow)
			.push(" AS sh WHERE ")
			.push(series)
			.push(".recnum = sh.recnum");
		if let Some(pk) = frags.pk_where(Some("sh")) {
			sql.push(" AND ").push(&pk);
		}
		if let Some(fl) = first_last_predicate(template, frags, Some("sh")) {
			sql.push(" AND ").push(&fl);
		}
		sql.push(" AND (").push(frags.npk_where.as_deref().unwrap_or("")).push(")");
	} else {
		sql.push("SELECT count(*) FROM ").push(&shadow).push(" AS sh");
		let mut conjuncts = Vec::new();
		if let Some(pk) = frags.pk_where(Some("sh")) {
			conjuncts.push(pk);
		}
		if let Some(fl) = first_last_predicate(template, frags, Some("sh")) {
			conjuncts.push(fl);
		}
		if !conjuncts.is_empty() {
			sql.push(" WHERE ").push(&conjuncts.join(" AND "));
		}
	}
	debug!(series = %series, "shadow count query");
	sql.finish()
}

/// Latest-version selection through the shadow table. Returns one
/// statement, or a temp-table preamble plus selection when both prime-key
/// and SQL filters are present.
pub fn all_query(
	template: &SeriesTemplate,
	frags: &WhereFragments,
	fields: &[String],
	limit: Option<u64>,
	temp_table: Option<&str>,
) -> String {
	let series = &template.info.name;
	let shadow = shadow_table_name(series);
	let order = order_by(template, false);

	let mut inner = SqlBuilder::new();
	inner.push("SELECT recnum FROM ").push(&shadow).push(" AS sh");
	let mut conjuncts = Vec::new();
	if let Some(pk) = frags.pk_where(Some("sh")) {
		conjuncts.push(pk);
	}
	if let Some(fl) = first_last_predicate(template, frags, Some("sh")) {
		conjuncts.push(fl);
	}
	if !conjuncts.is_empty() {
		inner.push(" WHERE ").push(&conjuncts.join(" AND "));
	}
	let inner = inner.finish();

	let mut sql = SqlBuilder::new();
	let recnum_source = match temp_table {
		Some(tmp) if frags.has_pk() && frags.has_npk() => {
			// The preamble pins the shadow scan so the selection's
			// FROM stays simple (and cursor-friendly).
			sql.push("CREATE TEMPORARY TABLE ")
				.push(tmp)
				.push(" AS ")
				.push(&inner)
				.push(STATEMENT_SEPARATOR);
			format!("SELECT recnum FROM {tmp}")
		}
		_ => inner,
	};

	sql.push("SELECT ")
		.push(&fields.join(", "))
		.push(" FROM ")
		.push(series)
		.push(" WHERE recnum IN (")
		.push(&recnum_source)
		.push(")");
	if let Some(npk) = &frags.npk_where {
		sql.push(" AND (").push(npk).push(")");
	}
	sql.push(" ORDER BY ").push(&order);
	if let Some(limit) = limit {
		sql.push(" LIMIT ").push(&limit.to_string());
	}
	sql.finish()
}

/// First or last `n` primary-key groups through the shadow table; negative
/// `n` selects from the end and orders descending.
pub fn n_query(
	template: &SeriesTemplate,
	frags: &WhereFragments,
	fields: &[String],
	n: i64,
	limit: Option<u64>,
) -> String {
	let series = &template.info.name;
	let shadow = shadow_table_name(series);
	let descending = n < 0;
	let order = order_by(template, descending);

	let mut inner = SqlBuilder::new();
	inner.push("SELECT recnum FROM ").push(&shadow).push(" AS sh");
	let mut conjuncts = Vec::new();
	if let Some(pk) = frags.pk_where(Some("sh")) {
		conjuncts.push(pk);
	}
	if let Some(fl) = first_last_predicate(template, frags, Some("sh")) {
		conjuncts.push(fl);
	}
	if !conjuncts.is_empty() {
		inner.push(" WHERE ").push(&conjuncts.join(" AND "));
	}
	inner.push(" ORDER BY ").push(&order_qualified(template, descending, "sh"));
	inner.push(" LIMIT ").push(&n.unsigned_abs().to_string());

	let mut sql = SqlBuilder::new();
	sql.push("SELECT ")
		.push(&fields.join(", "))
		.push(" FROM ")
		.push(series)
		.push(" WHERE recnum IN (")
		.push(&inner.finish())
		.push(")");
	if let Some(npk) = &frags.npk_where {
		sql.push(" AND (").push(npk).push(")");
	}
	sql.push(" ORDER BY ").push(&order);
	if let Some(limit) = limit {
		sql.push(" LIMIT ").push(&limit.to_string());
	}
	sql.finish()
}

/// Encode a `first`/`last(n)` filter as a predicate over the shadow table.
///
/// For a single group the winning index value is the per-group min/max over
/// the other primary-key columns; for `n > 1` the filter widens to the
/// first/last `n` distinct index values.
pub fn first_last_predicate(
	template: &SeriesTemplate,
	frags: &WhereFragments,
	qualifier: Option<&str>,
) -> Option<String> {
	let fl = frags.first_last.as_ref()?;
	let shadow = shadow_table_name(&template.info.name);
	let col = &fl.column;
	let qcol = match qualifier {
		Some(q) => format!("{q}.{col}"),
		None => col.clone(),
	};
	let agg = if fl.n > 0 { "min" } else { "max" };

	let others: Vec<&String> = template.info.pidx.iter().filter(|c| *c != col).collect();

	if fl.n.abs() == 1 {
		if others.is_empty() {
			return Some(format!("{qcol} = (SELECT {agg}({col}) FROM {shadow})"));
		}
		let other_list = others.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");
		let qualified_tuple = match qualifier {
			Some(q) => others
				.iter()
				.map(|c| format!("{q}.{c}"))
				.chain(std::iter::once(qcol.clone()))
				.collect::<Vec<_>>()
				.join(", "),
			None => format!("{other_list}, {col}"),
		};
		return Some(format!(
			"({qualified_tuple}) IN (SELECT {other_list}, {agg}({col}) FROM {shadow} GROUP BY {other_list})"
		));
	}

	let dir = if fl.n > 0 { "ASC" } else { "DESC" };
	Some(format!(
		"{qcol} IN (SELECT DISTINCT {col} FROM {shadow} ORDER BY {col} {dir} LIMIT {})",
		fl.n.unsigned_abs()
	))
}

pub fn order_by(template: &SeriesTemplate, descending: bool) -> String {
	order_clause(&template.info.pidx, descending, None)
}

fn order_qualified(template: &SeriesTemplate, descending: bool, qualifier: &str) -> String {
	order_clause(&template.info.pidx, descending, Some(qualifier))
}

fn order_clause(columns: &[String], descending: bool, qualifier: Option<&str>) -> String {
	if columns.is_empty() {
		return "recnum".to_string();
	}
	columns
		.iter()
		.map(|c| {
			let col = match qualifier {
				Some(q) => format!("{q}.{c}"),
				None => c.clone(),
			};
			if descending { format!("{col} DESC") } else { col }
		})
		.collect::<Vec<_>>()
		.join(", ")
}
