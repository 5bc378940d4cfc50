// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Bulk insertion of writable records on close, using the same column
//! order the wire contract fixes for selections.

use heliodb_catalog::{LinkKind, SegScope, SeriesTemplate};
use heliodb_core::{DbType, DbValue};
use heliodb_type::{Error, Result};
use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::{env::Env, record::RecordHandle};

/// Rows array-bound per statement execution.
const INSERT_BATCH: usize = 512;

/// Insert every writable (non-read-only, non-partial) record into its
/// series table.
#[instrument(level = "debug", skip_all, fields(records = records.len()))]
pub fn insert_records(env: &Env, records: &[RecordHandle]) -> Result<()> {
	let mut by_series: IndexMap<String, Vec<RecordHandle>> = IndexMap::new();
	for handle in records {
		let record = handle.read();
		if record.readonly || record.partial {
			continue;
		}
		by_series.entry(record.series.clone()).or_default().push(handle.clone());
	}
	if by_series.is_empty() {
		return Ok(());
	}

	env.db().make_writable()?;

	for (series, handles) in by_series {
		let template = env.template(&series)?;
		if !template.info.version.at_least(2, 0) {
			return Err(Error::CantCreateRecord(format!("{series} predates the insertable layout")));
		}
		assign_recnums(env, &series, &handles)?;

		let columns = template.wire_column_names();
		let types = column_types(&template);
		let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
		let sql = format!(
			"INSERT INTO {series} ({}) VALUES ({})",
			columns.join(", "),
			placeholders.join(", ")
		);

		let mut rows = Vec::with_capacity(handles.len());
		for handle in &handles {
			rows.push(row_values(&template, &handle.read())?);
		}
		for chunk in rows.chunks(INSERT_BATCH) {
			env.db().execute_prepared(&sql, &types, chunk)?;
		}
		debug!(series = %series, rows = rows.len(), "bulk insert complete");
	}
	Ok(())
}

/// Draw record numbers from the series sequence for records that have
/// none yet.
fn assign_recnums(env: &Env, series: &str, handles: &[RecordHandle]) -> Result<()> {
	let missing: Vec<&RecordHandle> =
		handles.iter().filter(|h| h.read().recnum < 0).collect();
	if missing.is_empty() {
		return Ok(());
	}
	let recnums = env.db().sequence_next(series, missing.len())?;
	if recnums.len() != missing.len() {
		return Err(Error::BadSequence(format!(
			"asked for {} record numbers, got {}",
			missing.len(),
			recnums.len()
		)));
	}
	for (handle, recnum) in missing.into_iter().zip(recnums) {
		handle.write().recnum = recnum;
	}
	Ok(())
}

fn column_types(template: &SeriesTemplate) -> Vec<DbType> {
	let mut types = vec![DbType::Int8, DbType::Int8, DbType::Int4, DbType::Int8, DbType::Text];
	for link in template.links.values() {
		match link.kind {
			LinkKind::Static => types.push(DbType::Int8),
			LinkKind::Dynamic => {
				types.push(DbType::Int4);
				types.extend(link.target_pidx_types.iter().map(|ty| DbType::from_htype(*ty)));
			}
		}
	}
	for kw in template.wire_keywords() {
		types.push(DbType::from_htype(kw.ty));
	}
	for seg in template.segments.values() {
		if seg.is_linked() {
			continue;
		}
		types.push(DbType::Text);
		if seg.scope == SegScope::VarDim {
			types.extend(std::iter::repeat_n(DbType::Int4, seg.naxis));
		}
	}
	types
}

fn row_values(template: &SeriesTemplate, record: &crate::record::Record) -> Result<Vec<DbValue>> {
	let mut row = vec![
		DbValue::Int8(record.recnum),
		DbValue::Int8(record.sunum),
		DbValue::Int4(record.slotnum),
		DbValue::Int8(record.sessionid),
		DbValue::Text(record.sessionns.clone()),
	];
	for def in template.links.values() {
		let link = record.link(&def.name)?;
		match def.kind {
			LinkKind::Static => row.push(DbValue::Int8(link.recnum)),
			LinkKind::Dynamic => {
				row.push(DbValue::Int4(link.is_set as i32));
				for (i, ty) in def.target_pidx_types.iter().enumerate() {
					let value = link
						.pidx_values
						.get(i)
						.cloned()
						.unwrap_or_else(|| ty.missing());
					row.push(DbValue::from(value));
				}
			}
		}
	}
	for kw in template.wire_keywords() {
		row.push(DbValue::from(record.keyword(&kw.name)?.clone()));
	}
	for def in template.segments.values() {
		if def.is_linked() {
			continue;
		}
		let seg = record.segment(&def.name)?;
		row.push(DbValue::Text(seg.file.clone()));
		if def.scope == SegScope::VarDim {
			for i in 0..def.naxis {
				row.push(DbValue::Int4(seg.axis.get(i).copied().unwrap_or(0)));
			}
		}
	}
	Ok(row)
}
