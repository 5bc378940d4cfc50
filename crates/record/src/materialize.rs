// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Row materialization: execute a synthesized selection and turn its
//! binary rows into cached records (or head-less partial records for
//! field-set queries).

use std::sync::Arc;

use heliodb_catalog::{LinkKind, SegScope, SeriesTemplate};
use heliodb_core::BinResult;
use heliodb_query::STATEMENT_SEPARATOR;
use heliodb_type::{Error, Result};
use parking_lot::RwLock;
use tracing::{instrument, trace};

use crate::{
	env::Env,
	record::{Record, RecordHandle},
};

#[derive(Clone, Copy, Debug, Default)]
pub struct MaterializeOptions<'a> {
	/// Keep only these segments on freshly populated records.
	pub goodsegs: Option<&'a [String]>,
	/// Produce non-cached partial records holding only these fields.
	pub fieldset: Option<&'a [String]>,
	/// The LIMIT the selection carried; a result of exactly this many
	/// rows reports truncation.
	pub limit: Option<u64>,
}

/// Execute `sql` (optionally a temp-table preamble plus selection) and
/// materialize the result. Returns the records and a truncation flag.
#[instrument(level = "debug", skip(env, sql, opts))]
pub fn materialize(
	env: &Env,
	series: &str,
	sql: &str,
	opts: MaterializeOptions<'_>,
) -> Result<(Vec<RecordHandle>, bool)> {
	let select = match sql.split_once(STATEMENT_SEPARATOR) {
		Some((preamble, select)) if preamble.to_ascii_uppercase().contains("CREATE TEMP") => {
			env.db().dms(preamble)?;
			select
		}
		_ => sql,
	};
	let result = env.db().query_bin(select)?;
	let template = env.template(series)?;
	populate_rows(env, &template, &result, opts)
}

/// Materialize the rows of an already-executed selection.
pub fn populate_rows(
	env: &Env,
	template: &Arc<SeriesTemplate>,
	result: &BinResult,
	opts: MaterializeOptions<'_>,
) -> Result<(Vec<RecordHandle>, bool)> {
	let _guard = env.materialize_lock().lock();

	let records = match opts.fieldset {
		Some(fields) => populate_partial(template, result, fields)?,
		None => populate_full(env, template, result, opts.goodsegs)?,
	};

	let truncated = opts.limit.is_some_and(|l| result.num_rows as u64 == l);
	if truncated {
		trace!(series = %template.info.name, limit = opts.limit, "selection hit its limit");
	}
	Ok((records, truncated))
}

fn populate_full(
	env: &Env,
	template: &Arc<SeriesTemplate>,
	result: &BinResult,
	goodsegs: Option<&[String]>,
) -> Result<Vec<RecordHandle>> {
	let expected = template.wire_column_names().len();
	if result.num_rows > 0 && result.num_cols() != expected {
		return Err(Error::BadQueryResult(format!(
			"series '{}' selection returned {} columns, expected {}",
			template.info.name,
			result.num_cols(),
			expected
		)));
	}

	let mut records = Vec::with_capacity(result.num_rows);
	for row in 0..result.num_rows {
		let recnum = result.recnum(row)?;
		let (handle, cached) =
			env.cache().acquire_or_insert(|| Record::from_template(template.clone(), recnum))?;
		if !cached {
			populate_record(&mut handle.write(), template, result, row)?;
			if let Some(goodsegs) = goodsegs {
				handle.write().segments.retain(|name, _| goodsegs.iter().any(|g| g == name));
			}
		}
		records.push(handle);
	}
	Ok(records)
}

/// Walk the fixed wire column order into one record.
fn populate_record(
	record: &mut Record,
	template: &SeriesTemplate,
	result: &BinResult,
	row: usize,
) -> Result<()> {
	let mut col = 1usize;
	record.sunum = result.value(row, col)?.as_i64().unwrap_or(-1);
	col += 1;
	record.slotnum = result.value(row, col)?.as_i64().unwrap_or(-1) as i32;
	col += 1;
	record.sessionid = result.value(row, col)?.as_i64().unwrap_or(-1);
	col += 1;
	record.sessionns = result.value(row, col)?.as_str().unwrap_or("").to_string();
	col += 1;

	for def in template.links.values() {
		match def.kind {
			LinkKind::Static => {
				let value = result.value(row, col)?;
				col += 1;
				let link = record.links.get_mut(&def.name).expect("link from template");
				link.recnum = value.as_i64().unwrap_or(-1);
			}
			LinkKind::Dynamic => {
				let isset = result.value(row, col)?;
				col += 1;
				let mut pidx_values = Vec::with_capacity(def.target_pidx_types.len());
				for ty in &def.target_pidx_types {
					pidx_values.push(result.value(row, col)?.to_hvalue(*ty)?);
					col += 1;
				}
				let link = record.links.get_mut(&def.name).expect("link from template");
				link.is_set = isset.as_i64().unwrap_or(0) != 0;
				link.pidx_values = pidx_values;
			}
		}
	}

	let keyword_names: Vec<String> = template.wire_keywords().map(|kw| kw.name.clone()).collect();
	for name in keyword_names {
		let ty = template.keywords[&name].ty;
		let value = result.value(row, col)?.to_hvalue(ty)?;
		col += 1;
		record.keywords.insert(name, value);
	}

	for def in template.segments.values() {
		if def.is_linked() {
			continue;
		}
		let file = result.value(row, col)?.as_str().unwrap_or("").to_string();
		col += 1;
		let mut axis = def.axis.clone();
		if def.scope == SegScope::VarDim {
			axis.clear();
			for _ in 0..def.naxis {
				axis.push(result.value(row, col)?.as_i64().unwrap_or(0) as i32);
				col += 1;
			}
		}
		let seg = record.segments.get_mut(&def.name).expect("segment from template");
		seg.file = file;
		seg.axis = axis;
	}

	record.readonly = true;
	Ok(())
}

/// Head-less partial records: requested fields only, template defaults for
/// the rest, never inserted into the cache.
fn populate_partial(
	template: &Arc<SeriesTemplate>,
	result: &BinResult,
	fields: &[String],
) -> Result<Vec<RecordHandle>> {
	let mut records = Vec::with_capacity(result.num_rows);
	for row in 0..result.num_rows {
		let recnum = result.recnum(row)?;
		let mut record = Record::from_template(template.clone(), recnum);
		record.partial = true;
		record.readonly = true;

		for (col, column) in result.columns.iter().enumerate().skip(1) {
			let name = column.name.to_ascii_lowercase();
			if !fields.iter().any(|f| f.eq_ignore_ascii_case(&name)) && !is_prefix_field(&name) {
				continue;
			}
			let value = result.value(row, col)?;
			match name.as_str() {
				"sunum" => record.sunum = value.as_i64().unwrap_or(-1),
				"slotnum" => record.slotnum = value.as_i64().unwrap_or(-1) as i32,
				"sessionid" => record.sessionid = value.as_i64().unwrap_or(-1),
				"sessionns" => record.sessionns = value.as_str().unwrap_or("").to_string(),
				_ => {
					let def = template.keyword(&name)?;
					record.keywords.insert(def.name.clone(), value.to_hvalue(def.ty)?);
				}
			}
		}
		records.push(Arc::new(RwLock::new(record)));
	}
	Ok(records)
}

fn is_prefix_field(name: &str) -> bool {
	matches!(name, "sunum" | "slotnum" | "sessionid" | "sessionns")
}
