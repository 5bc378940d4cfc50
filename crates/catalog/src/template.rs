// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Lazy materialization of per-series templates.
//!
//! Population order matters: segments first, then links, then keywords.
//! Keywords may reference links, and segment defs adopt values from
//! implicit keywords once those are read.

use std::{collections::HashMap, sync::Arc};

use heliodb_core::{DbClient, SqlBuilder};
use heliodb_type::{Error, HType, HValue, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::{
	KeywordDef, LinkDef, LinkKind, SegScope, SegmentDef, SeriesInfo, SeriesVersion, ShadowState,
	keyword::decode_flags,
};

/// Split `ns.name` into its lower-cased namespace and series parts.
pub fn split_namespace(series: &str) -> Result<(String, String)> {
	let lowered = series.trim().to_ascii_lowercase();
	match lowered.split_once('.') {
		Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
			Ok((ns.to_string(), name.to_string()))
		}
		_ => Err(Error::UnknownSeries(series.to_string())),
	}
}

/// The full schema of one series.
#[derive(Clone, Debug)]
pub struct SeriesTemplate {
	pub info: SeriesInfo,
	/// Rank order is insertion order for all three containers.
	pub keywords: IndexMap<String, KeywordDef>,
	pub links: IndexMap<String, LinkDef>,
	pub segments: IndexMap<String, SegmentDef>,
}

impl SeriesTemplate {
	pub fn keyword(&self, name: &str) -> Result<&KeywordDef> {
		self.keywords
			.get(&name.to_ascii_lowercase())
			.ok_or_else(|| Error::InvalidKeyword(format!("{}:{}", self.info.name, name)))
	}

	pub fn link(&self, name: &str) -> Result<&LinkDef> {
		self.links
			.get(&name.to_ascii_lowercase())
			.ok_or_else(|| Error::UnknownLink(format!("{}:{}", self.info.name, name)))
	}

	pub fn segment(&self, name: &str) -> Result<&SegmentDef> {
		self.segments
			.get(&name.to_ascii_lowercase())
			.ok_or_else(|| Error::NoSegment(format!("{}:{}", self.info.name, name)))
	}

	/// Primary-index keyword defs, in index order.
	pub fn pidx_keywords(&self) -> Vec<&KeywordDef> {
		self.info.pidx.iter().filter_map(|name| self.keywords.get(name)).collect()
	}

	/// Keywords that occupy a wire column, in rank order.
	pub fn wire_keywords(&self) -> impl Iterator<Item = &KeywordDef> {
		self.keywords.values().filter(|kw| kw.has_column())
	}

	/// The wire column names of a full record select, in the fixed order
	/// the materializer walks: the prefix, then links, keywords, and
	/// segments in rank order.
	pub fn wire_column_names(&self) -> Vec<String> {
		let mut cols: Vec<String> =
			["recnum", "sunum", "slotnum", "sessionid", "sessionns"].map(String::from).into();
		for link in self.links.values() {
			match link.kind {
				LinkKind::Static => cols.push(format!("ln_{}", link.name)),
				LinkKind::Dynamic => {
					cols.push(format!("ln_{}_isset", link.name));
					for pk in &link.target_pidx_names {
						cols.push(format!("ln_{}_{}", link.name, pk));
					}
				}
			}
		}
		for kw in self.wire_keywords() {
			cols.push(kw.name.clone());
		}
		for seg in self.segments.values() {
			if seg.is_linked() {
				continue;
			}
			cols.push(format!("sg_{:03}_file", seg.segnum));
			if seg.scope == SegScope::VarDim {
				for axis in 0..seg.naxis {
					cols.push(format!("sg_{:03}_axis{}", seg.segnum, axis));
				}
			}
		}
		cols
	}

	/// Estimated bytes one record occupies in a binary result; drives the
	/// LIMIT derived from the memory budget.
	pub fn estimated_row_bytes(&self) -> usize {
		// recnum, sunum, slotnum, sessionid, sessionns
		let mut bytes = 8 + 8 + 4 + 8 + 16;
		for link in self.links.values() {
			bytes += match link.kind {
				LinkKind::Static => 8,
				LinkKind::Dynamic => 4 + 8 * link.target_pidx_names.len(),
			};
		}
		for kw in self.wire_keywords() {
			bytes += kw.ty.row_bytes();
		}
		for seg in self.segments.values() {
			if !seg.is_linked() {
				bytes += 32 + 4 * (seg.num_wire_columns() - 1);
			}
		}
		bytes
	}
}

/// Process-wide catalog of series templates. Entries are created on first
/// reference and live until the owning environment is dropped.
#[derive(Debug, Default)]
pub struct TemplateCatalog {
	templates: Mutex<HashMap<String, Arc<SeriesTemplate>>>,
}

impl TemplateCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.templates.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.templates.lock().is_empty()
	}

	/// Drop every cached template.
	pub fn clear(&self) {
		self.templates.lock().clear();
	}

	/// Pre-seed a template, for tools and tests that build schemas
	/// directly instead of reading the catalog tables.
	pub fn insert(&self, template: SeriesTemplate) -> Arc<SeriesTemplate> {
		let key = template.info.name.clone();
		let template = Arc::new(template);
		self.templates.lock().insert(key, template.clone());
		template
	}

	/// The template for `series`, populating it on first touch.
	#[instrument(level = "debug", skip(self, db))]
	pub fn get(&self, db: &dyn DbClient, series: &str) -> Result<Arc<SeriesTemplate>> {
		let key = series.trim().to_ascii_lowercase();
		if let Some(template) = self.templates.lock().get(&key) {
			return Ok(template.clone());
		}
		let template = Arc::new(populate(db, &key)?);
		debug!(series = %key, keywords = template.keywords.len(), "populated series template");
		self.templates.lock().entry(key).or_insert(template.clone());
		Ok(template)
	}
}

fn populate(db: &dyn DbClient, series: &str) -> Result<SeriesTemplate> {
	let (ns, _) = split_namespace(series)?;

	let mut sql = SqlBuilder::new();
	sql.push("SELECT name FROM admin.ns WHERE name = '").push(&ns).push("'");
	if db.query_txt(&sql.finish())?.num_rows() == 0 {
		return Err(Error::UnknownSeries(series.to_string()));
	}

	let mut sql = SqlBuilder::new();
	sql.push(
		"SELECT seriesname, description, author, owner, unitsize, archive, retention, \
		 tapegroup, primary_idx, dbidx, version FROM ",
	)
	.push(&ns)
	.push(".drms_series WHERE lower(seriesname) = '")
	.push(series)
	.push("'");
	let row = db.query_txt(&sql.finish())?;
	if row.num_rows() == 0 {
		return Err(Error::UnknownSeries(series.to_string()));
	}

	let version = SeriesVersion::parse(row.field(0, 10)?)?;
	let info = SeriesInfo {
		name: series.to_string(),
		description: row.field(0, 1)?.to_string(),
		author: row.field(0, 2)?.to_string(),
		owner: row.field(0, 3)?.to_string(),
		unitsize: parse_int(row.field(0, 4)?)? as i32,
		archive: parse_int(row.field(0, 5)?)? != 0,
		retention: parse_int(row.field(0, 6)?)? as i32,
		tapegroup: parse_int(row.field(0, 7)?)? as i32,
		version,
		pidx: split_name_list(row.field(0, 8)?),
		dbidx: split_name_list(row.field(0, 9)?),
		shadow: ShadowState::Unknown,
	};

	let segments = populate_segments(db, &ns, series)?;
	let links = populate_links(db, &ns, series)?;
	let keywords = populate_keywords(db, &ns, series, version)?;

	let mut template = SeriesTemplate {
		info,
		keywords,
		links,
		segments,
	};
	adopt_segment_keywords(&mut template, version)?;
	resolve_indices(&mut template, version)?;
	Ok(template)
}

fn populate_segments(db: &dyn DbClient, ns: &str, series: &str) -> Result<IndexMap<String, SegmentDef>> {
	let mut sql = SqlBuilder::new();
	sql.push(
		"SELECT segmentname, segnum, scope, type, naxis, axis, unit, protocol, description, \
		 islink, linkname, targetseg FROM ",
	)
	.push(ns)
	.push(".drms_segment WHERE lower(seriesname) = '")
	.push(series)
	.push("' ORDER BY segnum");
	let res = db.query_txt(&sql.finish())?;

	let mut segments = IndexMap::with_capacity(res.num_rows());
	for row in 0..res.num_rows() {
		let name = res.field(row, 0)?.to_ascii_lowercase();
		let is_link = parse_bool(res.field(row, 9)?);
		let def = SegmentDef {
			name: name.clone(),
			segnum: parse_int(res.field(row, 1)?)? as usize,
			scope: SegScope::from_catalog(res.field(row, 2)?)?,
			ty: HType::from_name(res.field(row, 3)?)?,
			naxis: parse_int(res.field(row, 4)?)? as usize,
			axis: split_axis(res.field(row, 5)?)?,
			unit: res.field(row, 6)?.to_string(),
			protocol: res.field(row, 7)?.to_string(),
			description: res.field(row, 8)?.to_string(),
			cparms: None,
			bzero: 0.0,
			bscale: 1.0,
			link: is_link.then(|| res.field(row, 10).map(|s| s.to_ascii_lowercase())).transpose()?,
			target_seg: is_link.then(|| res.field(row, 11).map(str::to_string)).transpose()?,
		};
		segments.insert(name, def);
	}
	Ok(segments)
}

fn populate_links(db: &dyn DbClient, ns: &str, series: &str) -> Result<IndexMap<String, LinkDef>> {
	let mut sql = SqlBuilder::new();
	sql.push("SELECT linkname, target_seriesname, type, description FROM ")
		.push(ns)
		.push(".drms_link WHERE lower(seriesname) = '")
		.push(series)
		.push("' ORDER BY linkname");
	let res = db.query_txt(&sql.finish())?;

	let mut links = IndexMap::with_capacity(res.num_rows());
	for row in 0..res.num_rows() {
		let name = res.field(row, 0)?.to_ascii_lowercase();
		let target_series = res.field(row, 1)?.to_ascii_lowercase();
		let (pidx_names, pidx_types) = target_pidx(db, &target_series)?;
		let def = LinkDef {
			name: name.clone(),
			rank: row,
			kind: LinkKind::from_catalog(res.field(row, 2)?)?,
			target_series,
			description: res.field(row, 3)?.to_string(),
			target_pidx_names: pidx_names,
			target_pidx_types: pidx_types,
		};
		links.insert(name, def);
	}
	Ok(links)
}

/// Primary-index names and types of a link's target series, read without
/// recursing into full template population (self-links are legal).
fn target_pidx(db: &dyn DbClient, target: &str) -> Result<(Vec<String>, Vec<HType>)> {
	let Ok((tns, _)) = split_namespace(target) else {
		return Ok((Vec::new(), Vec::new()));
	};

	let mut sql = SqlBuilder::new();
	sql.push("SELECT primary_idx FROM ")
		.push(&tns)
		.push(".drms_series WHERE lower(seriesname) = '")
		.push(target)
		.push("'");
	let res = db.query_txt(&sql.finish())?;
	if res.num_rows() == 0 {
		// Target series may be gone; following the link reports it.
		return Ok((Vec::new(), Vec::new()));
	}
	let names = split_name_list(res.field(0, 0)?);
	if names.is_empty() {
		return Ok((Vec::new(), Vec::new()));
	}

	let mut sql = SqlBuilder::new();
	sql.push("SELECT keywordname, type FROM ")
		.push(&tns)
		.push(".drms_keyword WHERE lower(seriesname) = '")
		.push(target)
		.push("' AND lower(keywordname) IN (");
	sql.push_list(", ", names.iter().map(|n| format!("'{n}'")));
	sql.push(")");
	let res = db.query_txt(&sql.finish())?;

	let mut by_name = HashMap::with_capacity(res.num_rows());
	for row in 0..res.num_rows() {
		by_name.insert(
			res.field(row, 0)?.to_ascii_lowercase(),
			HType::from_name(res.field(row, 1)?)?,
		);
	}
	let mut types = Vec::with_capacity(names.len());
	for name in &names {
		let ty = by_name.get(name).copied().ok_or_else(|| {
			Error::InvalidKeyword(format!("{target}:{name} (primary index)"))
		})?;
		types.push(ty);
	}
	Ok((names, types))
}

fn populate_keywords(
	db: &dyn DbClient,
	ns: &str,
	series: &str,
	version: SeriesVersion,
) -> Result<IndexMap<String, KeywordDef>> {
	let mut sql = SqlBuilder::new();
	sql.push(
		"SELECT keywordname, linkname, targetkeyw, type, defaultval, format, unit, \
		 isconstant, persegment, description FROM ",
	)
	.push(ns)
	.push(".drms_keyword WHERE lower(seriesname) = '")
	.push(series)
	.push("' ORDER BY keywordname");
	let res = db.query_txt(&sql.finish())?;

	let ranked = version.at_least(2, 1);
	let mut defs = Vec::with_capacity(res.num_rows());
	for row in 0..res.num_rows() {
		let name = res.field(row, 0)?.to_ascii_lowercase();
		let link = non_empty(res.field(row, 1)?).map(|s| s.to_ascii_lowercase());
		let ty = if link.is_some() {
			// Linked keywords carry the target's type; recorded as
			// longlong placeholder until followed.
			HType::from_name(res.field(row, 3)?).unwrap_or(HType::LongLong)
		} else {
			HType::from_name(res.field(row, 3)?)?
		};
		let flags = decode_flags(parse_int(res.field(row, 8)?)?)?;
		let rank = if ranked { flags.rank() } else { row };
		defs.push(KeywordDef {
			name: name.clone(),
			rank,
			ty,
			format: res.field(row, 5)?.to_string(),
			unit: res.field(row, 6)?.to_string(),
			description: res.field(row, 9)?.to_string(),
			default: HValue::parse(ty, res.field(row, 4)?).unwrap_or_else(|_| ty.missing()),
			is_constant: parse_bool(res.field(row, 7)?),
			is_prime: false,
			is_external_prime: ranked && flags.external_prime(),
			per_segment: flags.per_segment(),
			link,
			target_key: non_empty(res.field(row, 2)?).map(str::to_string),
		});
	}

	defs.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.name.cmp(&b.name)));
	let mut keywords = IndexMap::with_capacity(defs.len());
	for (rank, mut def) in defs.into_iter().enumerate() {
		def.rank = rank;
		keywords.insert(def.name.clone(), def);
	}
	Ok(keywords)
}

/// Version-gated adoption of compression parameters and per-segment scaling
/// from implicit keywords.
fn adopt_segment_keywords(template: &mut SeriesTemplate, version: SeriesVersion) -> Result<()> {
	if !version.at_least(2, 0) {
		return Ok(());
	}
	let keywords = &template.keywords;
	for seg in template.segments.values_mut() {
		if let Some(kw) = keywords.get(&seg.cparms_keyword()) {
			if let Some(text) = kw.default.as_str() {
				if !text.is_empty() {
					seg.cparms = Some(text.to_string());
				}
			}
		}
		if version.at_least(2, 1) {
			if let Some(kw) = keywords.get(&format!("{}_bzero", seg.name)) {
				seg.bzero = kw.default.as_f64().unwrap_or(0.0);
			}
			if let Some(kw) = keywords.get(&format!("{}_bscale", seg.name)) {
				seg.bscale = kw.default.as_f64().unwrap_or(1.0);
			}
		}
	}
	Ok(())
}

/// Resolve the primary-index and db-index name lists against the keyword
/// container, marking prime membership.
fn resolve_indices(template: &mut SeriesTemplate, version: SeriesVersion) -> Result<()> {
	let pidx = template.info.pidx.clone();
	for name in &pidx {
		if !template.keywords.contains_key(name) {
			return Err(Error::InvalidKeyword(format!("{}:{} (primary index)", template.info.name, name)));
		}
		template.keywords[name].is_prime = true;

		if !version.at_least(2, 1) {
			// Pre-2.1 series have no external-prime flag; the index
			// keyword itself is user-visible, except that a slotted
			// `<base>_index` key translates to its base keyword.
			let external = match name.strip_suffix("_index") {
				Some(base) if template.keywords.contains_key(base) => base.to_string(),
				_ => name.clone(),
			};
			template.keywords[&external].is_external_prime = true;
		}
	}
	for name in &template.info.dbidx {
		if !template.keywords.contains_key(name) {
			return Err(Error::InvalidKeyword(format!("{}:{} (db index)", template.info.name, name)));
		}
	}
	Ok(())
}

fn parse_int(text: &str) -> Result<i64> {
	let text = text.trim();
	if text.is_empty() {
		return Ok(0);
	}
	text.parse().map_err(|_| Error::BadQueryResult(format!("expected integer, got '{text}'")))
}

fn parse_bool(text: &str) -> bool {
	matches!(text.trim(), "1" | "t" | "T" | "true" | "y" | "Y")
}

fn non_empty(text: &str) -> Option<&str> {
	let text = text.trim();
	(!text.is_empty()).then_some(text)
}

fn split_name_list(text: &str) -> Vec<String> {
	text.split(',')
		.map(|t| t.trim().to_ascii_lowercase())
		.filter(|t| !t.is_empty())
		.collect()
}

fn split_axis(text: &str) -> Result<Vec<i32>> {
	text.split([' ', ','])
		.filter(|t| !t.trim().is_empty())
		.map(|t| {
			t.trim().parse().map_err(|_| Error::BadQueryResult(format!("bad axis entry '{t}'")))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_split_namespace() {
		assert_eq!(split_namespace("HMI.M_45s").unwrap(), ("hmi".to_string(), "m_45s".to_string()));
		assert!(split_namespace("nodot").is_err());
		assert!(split_namespace(".leading").is_err());
	}

	#[test]
	fn test_split_name_list() {
		assert_eq!(split_name_list("T_OBS, camera"), vec!["t_obs", "camera"]);
		assert!(split_name_list(" ").is_empty());
	}

	#[test]
	fn test_split_axis() {
		assert_eq!(split_axis("4096 4096").unwrap(), vec![4096, 4096]);
		assert_eq!(split_axis("").unwrap(), Vec::<i32>::new());
		assert!(split_axis("4096 wide").is_err());
	}
}
