// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The composition layer: parse a specification, synthesize and run one
//! query per sub-spec, and assemble the results into a record set (or a
//! cursor over them).

use std::sync::Arc;

use heliodb_core::BinResult;
use heliodb_query::{QueryKind, QueryRequest, assemble, build, ensure_shadow};
use heliodb_spec::{SpecKind, SubSpec};
use heliodb_type::{Error, Result};
use tracing::instrument;
use uuid::Uuid;

use crate::{
	cursor::Cursor,
	env::Env,
	materialize::{MaterializeOptions, materialize},
	record::RecordHandle,
	set::{RecordSet, RsStatus, SubSpecState},
};

fn sub_state(sub: &SubSpec) -> SubSpecState {
	SubSpecState {
		query: sub.raw.clone(),
		kind: sub.kind,
		all_versions: sub.all_versions,
		seglist: sub.seglist.clone(),
		start: -1,
		current: -1,
	}
}

/// Reject sub-spec kinds the configuration or installation cannot serve.
fn gate_kind(env: &Env, sub: &SubSpec) -> Result<()> {
	match sub.kind {
		SpecKind::Drms | SpecKind::Vot => Ok(()),
		SpecKind::PlainFile => {
			if env.config.allow_dsds {
				Ok(())
			} else {
				Err(Error::NoLegacySupport)
			}
		}
		SpecKind::Legacy | SpecKind::LegacyPort => {
			if !env.config.allow_dsds {
				return Err(Error::NoLegacySupport);
			}
			env.legacy().map(|_| ())
		}
	}
}

/// Open every record the specification names, fully materialized.
#[instrument(level = "debug", skip(env))]
pub fn open_records(env: &Arc<Env>, spec_text: &str) -> Result<RecordSet> {
	open_with(env, spec_text, |_| QueryRequest::all(), None)
}

/// Open the first (positive `n`) or last (negative `n`) records per
/// primary-key order. Negative `n` delivers descending order for the
/// caller to reverse.
pub fn open_n_records(env: &Arc<Env>, spec_text: &str, n: i64) -> Result<RecordSet> {
	open_with(
		env,
		spec_text,
		|_| QueryRequest {
			kind: QueryKind::NRecords(n),
			fields: None,
			cursor: false,
			unique: false,
		},
		None,
	)
}

/// Open partial records holding only the requested keywords; partial
/// records bypass the cache and die with the set.
pub fn open_partial_records(env: &Arc<Env>, spec_text: &str, fields: &[String]) -> Result<RecordSet> {
	open_with(
		env,
		spec_text,
		|_| QueryRequest {
			kind: QueryKind::PartialAll,
			fields: Some(fields.to_vec()),
			cursor: false,
			unique: false,
		},
		Some(fields),
	)
}

fn open_with(
	env: &Arc<Env>,
	spec_text: &str,
	request: impl Fn(&SubSpec) -> QueryRequest,
	fieldset: Option<&[String]>,
) -> Result<RecordSet> {
	let spec = heliodb_spec::parse(spec_text)?;
	let mut rs = RecordSet::new(env.clone());
	let mut truncated = false;

	for sub in &spec.sub_specs {
		gate_kind(env, sub)?;
		if sub.kind != SpecKind::Drms {
			// Non-catalog sub-specs carry no catalog records; their
			// payloads are handled by the adapter and export layers.
			rs.append_sub_spec(sub_state(sub), Vec::new());
			continue;
		}

		let template = env.template(&sub.series)?;
		let frags = assemble(&template, sub)?;
		let shadow = ensure_shadow(env.db(), env.shadow_memo(), &template, &frags, &env.config)?;
		let built = build(&template, shadow, &frags, &request(sub), &env.config)?;

		let goodsegs = (!sub.seglist.is_empty()).then(|| sub.seglist.clone());
		let opts = MaterializeOptions {
			goodsegs: goodsegs.as_deref(),
			fieldset,
			limit: built.limit,
		};
		let (records, trunc) = materialize(env, &sub.series, &built.sql, opts)?;
		truncated |= trunc;
		rs.append_sub_spec(sub_state(sub), records);
	}

	if truncated {
		rs.status = RsStatus::Truncated;
	}
	Ok(rs)
}

/// Count the records the specification matches, without materializing.
#[instrument(level = "debug", skip(env))]
pub fn count_records(env: &Arc<Env>, spec_text: &str) -> Result<i64> {
	let spec = heliodb_spec::parse(spec_text)?;
	let mut total = 0i64;
	for sub in &spec.sub_specs {
		gate_kind(env, sub)?;
		if sub.kind != SpecKind::Drms {
			continue;
		}
		let template = env.template(&sub.series)?;
		let frags = assemble(&template, sub)?;
		let shadow = ensure_shadow(env.db(), env.shadow_memo(), &template, &frags, &env.config)?;
		let built = build(&template, shadow, &frags, &QueryRequest::count(), &env.config)?;
		total += env.db().query_bin(&built.sql)?.scalar_i64()?;
	}
	Ok(total)
}

/// A bare field listing for one sub-spec, not materialized into records.
pub fn list_fields(
	env: &Arc<Env>,
	spec_text: &str,
	fields: &[String],
	unique: bool,
) -> Result<BinResult> {
	let spec = heliodb_spec::parse(spec_text)?;
	let [sub] = spec.sub_specs.as_slice() else {
		return Err(Error::InvalidSpec("field listings take exactly one sub-spec".into()));
	};
	gate_kind(env, sub)?;
	if sub.kind != SpecKind::Drms {
		return Err(Error::InvalidSpec("field listings require a catalog series".into()));
	}
	let template = env.template(&sub.series)?;
	let frags = assemble(&template, sub)?;
	let shadow = ensure_shadow(env.db(), env.shadow_memo(), &template, &frags, &env.config)?;
	let req = QueryRequest {
		kind: QueryKind::FieldList,
		fields: Some(fields.to_vec()),
		cursor: false,
		unique,
	};
	let built = build(&template, shadow, &frags, &req, &env.config)?;
	env.db().query_bin(&built.sql)
}

/// Create `n` fresh writable records in `series`, numbered from the
/// series sequence. Closing the returned set with the INSERT action
/// commits them.
pub fn create_records(env: &Arc<Env>, series: &str, n: usize) -> Result<RecordSet> {
	if n == 0 {
		return Err(Error::BadRecordCount(0));
	}
	let template = env.template(series)?;
	env.db().make_writable()?;
	let recnums = env.db().sequence_next(&template.info.name, n)?;
	if recnums.len() != n {
		return Err(Error::CantCreateRecord(template.info.name.clone()));
	}

	let mut records: Vec<RecordHandle> = Vec::with_capacity(n);
	{
		let _guard = env.materialize_lock().lock();
		for recnum in recnums {
			let (handle, cached) = env
				.cache()
				.acquire_or_insert(|| crate::record::Record::from_template(template.clone(), recnum))?;
			if cached {
				// A sequence value collided with a live record; back
				// out everything acquired so far.
				env.cache().release(&handle.read().key()).ok();
				for acquired in &records {
					env.cache().release(&acquired.read().key()).ok();
				}
				return Err(Error::CantCreateRecord(format!(
					"{}:{recnum} already exists",
					template.info.name
				)));
			}
			records.push(handle);
		}
	}

	let mut rs = RecordSet::new(env.clone());
	rs.append_sub_spec(
		SubSpecState {
			query: template.info.name.clone(),
			kind: SpecKind::Drms,
			all_versions: false,
			seglist: Vec::new(),
			start: -1,
			current: -1,
		},
		records,
	);
	Ok(rs)
}

/// Open a cursor-backed set: nothing is materialized until the first
/// chunk is fetched.
#[instrument(level = "debug", skip(env))]
pub fn open_cursor(env: &Arc<Env>, spec_text: &str) -> Result<RecordSet> {
	let spec = heliodb_spec::parse(spec_text)?;
	let mut rs = RecordSet::new(env.clone());
	let mut cursor_subs = Vec::new();

	for sub in &spec.sub_specs {
		gate_kind(env, sub)?;
		if sub.kind != SpecKind::Drms {
			rs.append_sub_spec(sub_state(sub), Vec::new());
			continue;
		}

		let template = env.template(&sub.series)?;
		let frags = assemble(&template, sub)?;
		let shadow = ensure_shadow(env.db(), env.shadow_memo(), &template, &frags, &env.config)?;
		let req = QueryRequest {
			cursor: true,
			..QueryRequest::all()
		};
		let built = build(&template, shadow, &frags, &req, &env.config)?;

		// A temp-table preamble must run now so the cursor's FROM can
		// reference it.
		let (preamble, select) = built.split();
		if let Some(preamble) = preamble {
			env.db().dms(preamble)?;
		}
		let name = format!("helio_cur_{}", Uuid::new_v4().simple());
		env.db()
			.dms(&format!("DECLARE {name} NO SCROLL CURSOR FOR ({select}) FOR READ ONLY"))?;
		cursor_subs.push((name, sub.series.clone(), sub.all_versions, sub.seglist.clone()));
		rs.append_sub_spec(sub_state(sub), Vec::new());
	}

	rs.set_cursor(Cursor::new(cursor_subs, env.config.chunk_size));
	Ok(rs)
}
