// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Query dispatch: per sub-spec, pick the cheapest route (simple select,
//! shadow-table variant, or the legacy self-join) and emit the SQL plus the
//! LIMIT communicated back to the caller for truncation detection.

use heliodb_catalog::{SeriesTemplate, ShadowState};
use heliodb_core::{EnvConfig, SqlBuilder};
use heliodb_type::{Error, Result};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{STATEMENT_SEPARATOR, WhereFragments, shadow};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryKind {
	/// A single integer: how many records the sub-spec matches.
	Count,
	/// Full records.
	All,
	/// Partial records holding a requested keyword subset.
	PartialAll,
	/// A bare field listing, not materialized into records.
	FieldList,
	/// The first (positive) or last (negative) n primary-key groups.
	NRecords(i64),
}

#[derive(Clone, Debug)]
pub struct QueryRequest {
	pub kind: QueryKind,
	/// Keyword names for [`QueryKind::PartialAll`] / [`QueryKind::FieldList`].
	pub fields: Option<Vec<String>>,
	/// Strip the LIMIT clause; the cursor engine bounds fetches itself.
	pub cursor: bool,
	/// DISTINCT over the requested fields (field listings only).
	pub unique: bool,
}

impl QueryRequest {
	pub fn all() -> Self {
		Self {
			kind: QueryKind::All,
			fields: None,
			cursor: false,
			unique: false,
		}
	}

	pub fn count() -> Self {
		Self {
			kind: QueryKind::Count,
			fields: None,
			cursor: false,
			unique: false,
		}
	}
}

/// A synthesized query: one statement, or a temp-table preamble and the
/// selection separated by [`STATEMENT_SEPARATOR`].
#[derive(Clone, Debug)]
pub struct BuiltQuery {
	pub sql: String,
	/// The LIMIT applied, if any; a result with exactly this many rows
	/// was truncated.
	pub limit: Option<u64>,
}

impl BuiltQuery {
	/// Split a temp-table preamble from the selection.
	pub fn split(&self) -> (Option<&str>, &str) {
		match self.sql.split_once(STATEMENT_SEPARATOR) {
			Some((preamble, select)) if preamble.to_ascii_uppercase().contains("CREATE TEMP") => {
				(Some(preamble), select)
			}
			_ => (None, self.sql.as_str()),
		}
	}
}

#[instrument(level = "debug", skip_all, fields(series = %template.info.name, kind = ?req.kind))]
pub fn build(
	template: &SeriesTemplate,
	shadow_state: ShadowState,
	frags: &WhereFragments,
	req: &QueryRequest,
	config: &EnvConfig,
) -> Result<BuiltQuery> {
	let fields = select_fields(template, req)?;
	let mem_limit = derive_limit(template, config);
	let limit = if req.cursor { None } else { Some(mem_limit) };

	// A record-number filter names exact versions, so version grouping
	// (and with it the shadow table) does not apply.
	let simple = frags.all_versions || frags.has_recnum() || !template.info.has_pidx();
	let shadowed = !simple && shadow_state == ShadowState::Present;

	let sql = match &req.kind {
		QueryKind::Count => {
			if simple {
				simple_count(template, frags)
			} else if shadowed {
				shadow::count_query(template, frags)
			} else {
				legacy_count(template, frags)
			}
		}
		QueryKind::All | QueryKind::PartialAll | QueryKind::FieldList => {
			if simple {
				simple_all(template, frags, &fields, limit, req)
			} else if shadowed {
				let temp = temp_table_name();
				shadow::all_query(template, frags, &fields, limit, Some(temp.as_str()))
			} else {
				legacy_all(template, frags, &fields, limit)
			}
		}
		QueryKind::NRecords(n) => {
			let n = *n;
			if n == 0 {
				return Err(Error::BadRecordCount(0));
			}
			if simple {
				simple_n(template, frags, &fields, n)
			} else if shadowed {
				shadow::n_query(template, frags, &fields, n, limit)
			} else {
				legacy_n(template, frags, &fields, n, limit)
			}
		}
	};

	debug!(sql = %sql, "synthesized query");
	Ok(BuiltQuery {
		sql,
		limit: match req.kind {
			QueryKind::Count => None,
			_ => limit,
		},
	})
}

/// Unique name for a transaction-scoped temporary table.
pub fn temp_table_name() -> String {
	format!("helio_tmp_{}", Uuid::new_v4().simple())
}

fn derive_limit(template: &SeriesTemplate, config: &EnvConfig) -> u64 {
	let row_bytes = template.estimated_row_bytes().max(1);
	((config.query_mem_budget / row_bytes) as u64).max(1)
}

fn select_fields(template: &SeriesTemplate, req: &QueryRequest) -> Result<Vec<String>> {
	match &req.kind {
		QueryKind::Count => Ok(Vec::new()),
		QueryKind::All | QueryKind::NRecords(_) => Ok(template.wire_column_names()),
		QueryKind::PartialAll | QueryKind::FieldList => {
			let requested = req.fields.as_deref().unwrap_or(&[]);
			if requested.is_empty() {
				return Err(Error::InvalidData("field query without fields".into()));
			}
			let mut fields = Vec::with_capacity(requested.len() + 1);
			// DISTINCT listings carry only the requested fields;
			// everything else leads with the record number.
			if !(req.kind == QueryKind::FieldList && req.unique) {
				fields.push("recnum".to_string());
			}
			for name in requested {
				let name = name.to_ascii_lowercase();
				match name.as_str() {
					"recnum" => continue,
					"sunum" | "slotnum" | "sessionid" | "sessionns" => {
						fields.push(name);
					}
					_ => {
						let kw = template.keyword(&name)?;
						if !kw.has_column() {
							return Err(Error::InvalidKeyword(format!(
								"{}:{} has no stored column",
								template.info.name, name
							)));
						}
						fields.push(kw.name.clone());
					}
				}
			}
			Ok(fields)
		}
	}
}

fn simple_count(template: &SeriesTemplate, frags: &WhereFragments) -> String {
	let mut sql = SqlBuilder::new();
	sql.push("SELECT count(*) FROM ").push(&template.info.name);
	if let Some(w) = frags.combined_where() {
		sql.push(" WHERE ").push(&w);
	}
	sql.finish()
}

fn simple_all(
	template: &SeriesTemplate,
	frags: &WhereFragments,
	fields: &[String],
	limit: Option<u64>,
	req: &QueryRequest,
) -> String {
	let mut sql = SqlBuilder::new();
	sql.push("SELECT ");
	if req.kind == QueryKind::FieldList && req.unique {
		sql.push("DISTINCT ");
	}
	sql.push(&fields.join(", ")).push(" FROM ").push(&template.info.name);
	if let Some(w) = frags.combined_where() {
		sql.push(" WHERE ").push(&w);
	}
	sql.push(" ORDER BY ").push(&shadow::order_by(template, false));
	if let Some(limit) = limit {
		sql.push(" LIMIT ").push(&limit.to_string());
	}
	sql.finish()
}

fn simple_n(template: &SeriesTemplate, frags: &WhereFragments, fields: &[String], n: i64) -> String {
	let mut sql = SqlBuilder::new();
	sql.push("SELECT ").push(&fields.join(", ")).push(" FROM ").push(&template.info.name);
	if let Some(w) = frags.combined_where() {
		sql.push(" WHERE ").push(&w);
	}
	sql.push(" ORDER BY ").push(&shadow::order_by(template, n < 0));
	sql.push(" LIMIT ").push(&n.unsigned_abs().to_string());
	sql.finish()
}

/// Count of latest-version records without a shadow table: count the
/// per-tuple groups directly.
fn legacy_count(template: &SeriesTemplate, frags: &WhereFragments) -> String {
	let pk = template.info.pidx.join(", ");
	let mut sql = SqlBuilder::new();
	sql.push("SELECT count(*) FROM (SELECT max(recnum) FROM ")
		.push(&template.info.name)
		.push(&legacy_where(template, frags))
		.push(" GROUP BY ")
		.push(&pk)
		.push(") AS q1");
	sql.finish()
}

/// Latest-version selection without a shadow table: the self-join over the
/// series table that pins each primary-key tuple to its maximum recnum.
fn legacy_all(
	template: &SeriesTemplate,
	frags: &WhereFragments,
	fields: &[String],
	limit: Option<u64>,
) -> String {
	let series = &template.info.name;
	let pk = template.info.pidx.join(", ");
	let join_on = template
		.info
		.pidx
		.iter()
		.map(|c| format!("t2.{c} = q1.{c}"))
		.collect::<Vec<_>>()
		.join(" AND ");
	let group_q1 = template
		.info
		.pidx
		.iter()
		.map(|c| format!("q1.{c}"))
		.collect::<Vec<_>>()
		.join(", ");

	let qualified_fields =
		fields.iter().map(|f| format!("{series}.{f}")).collect::<Vec<_>>().join(", ");

	let mut sql = SqlBuilder::new();
	sql.push("SELECT ")
		.push(&qualified_fields)
		.push(" FROM ")
		.push(series)
		.push(", (SELECT q2.max1 FROM (SELECT max(t2.recnum) AS max1, min(q1.recmax) AS max2 FROM ")
		.push(series)
		.push(" AS t2, (SELECT ")
		.push(&pk)
		.push(", max(recnum) AS recmax FROM ")
		.push(series)
		.push(&legacy_where(template, frags))
		.push(" GROUP BY ")
		.push(&pk)
		.push(") AS q1 WHERE ")
		.push(&join_on)
		.push(" GROUP BY ")
		.push(&group_q1)
		.push(") AS q2 WHERE q2.max1 = q2.max2) AS q3 WHERE ")
		.push(series)
		.push(".recnum = q3.max1");
	if let Some(limit) = limit {
		sql.push(" LIMIT ").push(&limit.to_string());
	}
	sql.finish()
}

fn legacy_n(
	template: &SeriesTemplate,
	frags: &WhereFragments,
	fields: &[String],
	n: i64,
	limit: Option<u64>,
) -> String {
	let series = &template.info.name;
	let pk = template.info.pidx.join(", ");
	let order = shadow::order_by(template, n < 0);

	let mut sql = SqlBuilder::new();
	sql.push("SELECT ")
		.push(&fields.join(", "))
		.push(" FROM ")
		.push(series)
		.push(" WHERE recnum IN (SELECT max(recnum) FROM ")
		.push(series)
		.push(&legacy_where(template, frags))
		.push(" GROUP BY ")
		.push(&pk)
		.push(" ORDER BY ")
		.push(&order)
		.push(" LIMIT ")
		.push(&n.unsigned_abs().to_string())
		.push(") ORDER BY ")
		.push(&order);
	if let Some(limit) = limit {
		sql.push(" LIMIT ").push(&limit.to_string());
	}
	sql.finish()
}

/// The WHERE clause of the legacy group-by subquery, including any
/// first/last filter encoded against the base table.
fn legacy_where(template: &SeriesTemplate, frags: &WhereFragments) -> String {
	let mut conjuncts = Vec::new();
	if let Some(w) = frags.combined_where() {
		conjuncts.push(w);
	}
	if let Some(fl) = legacy_first_last(template, frags) {
		conjuncts.push(fl);
	}
	if conjuncts.is_empty() {
		String::new()
	} else {
		format!(" WHERE {}", conjuncts.join(" AND "))
	}
}

/// first/last encoded against the base table when no shadow exists.
fn legacy_first_last(template: &SeriesTemplate, frags: &WhereFragments) -> Option<String> {
	let fl = frags.first_last.as_ref()?;
	let series = &template.info.name;
	let col = &fl.column;
	let agg = if fl.n > 0 { "min" } else { "max" };
	let others: Vec<&String> = template.info.pidx.iter().filter(|c| *c != col).collect();

	if fl.n.abs() == 1 {
		if others.is_empty() {
			return Some(format!("{col} = (SELECT {agg}({col}) FROM {series})"));
		}
		let other_list = others.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");
		return Some(format!(
			"({other_list}, {col}) IN (SELECT {other_list}, {agg}({col}) FROM {series} GROUP BY {other_list})"
		));
	}
	let dir = if fl.n > 0 { "ASC" } else { "DESC" };
	Some(format!(
		"{col} IN (SELECT DISTINCT {col} FROM {series} ORDER BY {col} {dir} LIMIT {})",
		fl.n.unsigned_abs()
	))
}

#[cfg(test)]
mod tests {
	use heliodb_spec::parse;
	use heliodb_testing::fixtures;

	use super::*;
	use crate::assemble;

	fn build_for(spec_text: &str, shadow_state: ShadowState, req: QueryRequest) -> BuiltQuery {
		let template = fixtures::lev1_template();
		let spec = parse(spec_text).unwrap();
		let frags = assemble(&template, &spec.sub_specs[0]).unwrap();
		build(&template, shadow_state, &frags, &req, &EnvConfig::default()).unwrap()
	}

	#[test]
	fn test_shadow_count_avoids_base_group_by() {
		let q = build_for("aia.lev1[wavelnth=94]", ShadowState::Present, QueryRequest::count());
		assert_eq!(q.sql, "SELECT count(*) FROM aia.lev1_shadow AS sh WHERE sh.wavelnth = 94");
		assert!(!q.sql.contains("GROUP BY"));
		assert!(q.limit.is_none());
	}

	#[test]
	fn test_legacy_count_groups_base_table() {
		let q = build_for("aia.lev1[wavelnth=94]", ShadowState::Absent, QueryRequest::count());
		assert!(q.sql.contains("GROUP BY t_obs_index, wavelnth"));
		assert!(q.sql.starts_with("SELECT count(*) FROM (SELECT max(recnum) FROM aia.lev1"));
	}

	#[test]
	fn test_all_versions_is_a_simple_select() {
		let q = build_for("aia.lev1[!quality >= 0!]", ShadowState::Present, QueryRequest::all());
		assert!(q.sql.starts_with("SELECT recnum, sunum, slotnum, sessionid, sessionns"));
		assert!(!q.sql.contains("_shadow"));
		assert!(q.sql.contains("WHERE (quality >= 0)"));
		assert!(q.sql.contains("ORDER BY t_obs_index, wavelnth"));
		assert!(q.sql.contains("LIMIT"));
	}

	#[test]
	fn test_recnum_filter_skips_shadow() {
		let q = build_for("aia.lev1[recnum=17]", ShadowState::Present, QueryRequest::all());
		assert!(!q.sql.contains("_shadow"));
		assert!(q.sql.contains("WHERE recnum = 17"));
	}

	#[test]
	fn test_shadow_all_routes_through_shadow() {
		let q = build_for("aia.lev1[wavelnth=94]", ShadowState::Present, QueryRequest::all());
		assert!(q.sql.contains("IN (SELECT recnum FROM aia.lev1_shadow AS sh WHERE sh.wavelnth = 94)"));
		assert!(q.sql.contains("ORDER BY t_obs_index, wavelnth"));
		let (preamble, _) = q.split();
		assert!(preamble.is_none());
	}

	#[test]
	fn test_pk_plus_npk_uses_temp_table() {
		let q = build_for(
			"aia.lev1[wavelnth=94][?quality >= 0?]",
			ShadowState::Present,
			QueryRequest::all(),
		);
		let (preamble, select) = q.split();
		let preamble = preamble.expect("expected temp-table preamble");
		assert!(preamble.starts_with("CREATE TEMPORARY TABLE helio_tmp_"));
		assert!(preamble.contains("aia.lev1_shadow"));
		assert!(select.contains("AND (quality >= 0)"));
	}

	#[test]
	fn test_legacy_all_self_join_shape() {
		let q = build_for("aia.lev1[wavelnth=94]", ShadowState::Absent, QueryRequest::all());
		assert!(q.sql.contains("AS q1"));
		assert!(q.sql.contains("AS q2 WHERE q2.max1 = q2.max2"));
		assert!(q.sql.contains("AS q3 WHERE aia.lev1.recnum = q3.max1"));
		assert!(q.sql.contains("max(recnum) AS recmax FROM aia.lev1 WHERE wavelnth = 94 GROUP BY"));
	}

	#[test]
	fn test_n_records_negative_orders_descending() {
		let req = QueryRequest {
			kind: QueryKind::NRecords(-2),
			fields: None,
			cursor: false,
			unique: false,
		};
		let q = build_for("aia.lev1", ShadowState::Present, req);
		assert!(q.sql.contains("ORDER BY sh.t_obs_index DESC, sh.wavelnth DESC LIMIT 2"));
		assert!(q.sql.contains(") ORDER BY t_obs_index DESC, wavelnth DESC LIMIT"));
	}

	#[test]
	fn test_n_records_zero_rejected() {
		let template = fixtures::lev1_template();
		let req = QueryRequest {
			kind: QueryKind::NRecords(0),
			fields: None,
			cursor: false,
			unique: false,
		};
		let frags = WhereFragments::default();
		assert!(matches!(
			build(&template, ShadowState::Absent, &frags, &req, &EnvConfig::default()),
			Err(Error::BadRecordCount(0))
		));
	}

	#[test]
	fn test_cursor_strips_limit() {
		let req = QueryRequest {
			cursor: true,
			..QueryRequest::all()
		};
		let q = build_for("aia.lev1[wavelnth=94]", ShadowState::Present, req);
		assert!(!q.sql.contains("LIMIT"));
		assert!(q.limit.is_none());
	}

	#[test]
	fn test_partial_fields_lead_with_recnum() {
		let req = QueryRequest {
			kind: QueryKind::PartialAll,
			fields: Some(vec!["quality".into(), "camera".into()]),
			cursor: false,
			unique: false,
		};
		let q = build_for("aia.lev1[!1=1!]", ShadowState::Absent, req);
		assert!(q.sql.starts_with("SELECT recnum, quality, camera FROM aia.lev1"));
	}

	#[test]
	fn test_unique_field_list_is_distinct() {
		let req = QueryRequest {
			kind: QueryKind::FieldList,
			fields: Some(vec!["wavelnth".into()]),
			cursor: false,
			unique: true,
		};
		let q = build_for("aia.lev1[!1=1!]", ShadowState::Absent, req);
		assert!(q.sql.starts_with("SELECT DISTINCT wavelnth FROM aia.lev1"));
	}

	#[test]
	fn test_unknown_field_rejected() {
		let req = QueryRequest {
			kind: QueryKind::PartialAll,
			fields: Some(vec!["no_such_keyword".into()]),
			cursor: false,
			unique: false,
		};
		let template = fixtures::lev1_template();
		let frags = WhereFragments::default();
		assert!(build(&template, ShadowState::Absent, &frags, &req, &EnvConfig::default()).is_err());
	}

	#[test]
	fn test_first_filter_encodes_min_over_shadow() {
		let q = build_for("aia.lev1[t_obs=first]", ShadowState::Present, QueryRequest::count());
		assert!(q.sql.contains("min(t_obs_index) FROM aia.lev1_shadow GROUP BY wavelnth"));
	}
}
