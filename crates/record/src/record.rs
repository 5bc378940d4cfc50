// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::{path::PathBuf, sync::Arc};

use heliodb_catalog::{LinkKind, SeriesTemplate};
use heliodb_storage::StorageUnitInfo;
use heliodb_type::{Error, HValue, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Shared handle to one record. The cache's explicit refcount governs
/// residency; the `Arc` only governs memory.
pub type RecordHandle = Arc<RwLock<Record>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Lifetime {
	#[default]
	Transient,
	Permanent,
}

/// Per-record state of one link.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkInstance {
	pub kind: LinkKind,
	pub target_series: String,
	/// Resolved target record number; -1 until followed (or when the
	/// target is missing).
	pub recnum: i64,
	pub was_followed: bool,
	/// Dynamic links only: the source row carries target key values.
	pub is_set: bool,
	/// Target primary-key values stored on the source row, in target
	/// index order.
	pub pidx_values: Vec<HValue>,
}

/// Per-record state of one segment.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentInstance {
	pub file: String,
	/// Actual per-record dimensions; equals the declared axis for fixed
	/// segments.
	pub axis: Vec<i32>,
}

/// One row of one series.
#[derive(Clone, Debug)]
pub struct Record {
	pub series: String,
	pub template: Arc<SeriesTemplate>,
	pub recnum: i64,
	/// -1 when the record owns no storage unit.
	pub sunum: i64,
	pub slotnum: i32,
	pub sessionid: i64,
	pub sessionns: String,
	pub readonly: bool,
	pub lifetime: Lifetime,
	/// Populated with a restricted field set; never cached.
	pub partial: bool,
	pub keywords: IndexMap<String, HValue>,
	pub links: IndexMap<String, LinkInstance>,
	pub segments: IndexMap<String, SegmentInstance>,
	/// Online directory of the staged storage unit.
	pub su_dir: Option<PathBuf>,
	pub suinfo: Option<StorageUnitInfo>,
}

impl Record {
	/// A fresh record carrying the template's defaults.
	pub fn from_template(template: Arc<SeriesTemplate>, recnum: i64) -> Self {
		let keywords = template
			.keywords
			.values()
			.map(|kw| (kw.name.clone(), kw.default.clone()))
			.collect();
		let links = template
			.links
			.values()
			.map(|def| {
				let instance = LinkInstance {
					kind: def.kind,
					target_series: def.target_series.clone(),
					recnum: -1,
					was_followed: false,
					is_set: false,
					pidx_values: Vec::new(),
				};
				(def.name.clone(), instance)
			})
			.collect();
		let segments = template
			.segments
			.values()
			.map(|def| {
				let instance = SegmentInstance {
					file: String::new(),
					axis: def.axis.clone(),
				};
				(def.name.clone(), instance)
			})
			.collect();
		Self {
			series: template.info.name.clone(),
			template,
			recnum,
			sunum: -1,
			slotnum: -1,
			sessionid: -1,
			sessionns: String::new(),
			readonly: false,
			lifetime: Lifetime::default(),
			partial: false,
			keywords,
			links,
			segments,
			su_dir: None,
			suinfo: None,
		}
	}

	/// The cache key of this record.
	pub fn key(&self) -> String {
		cache_key(&self.series, self.recnum)
	}

	pub fn keyword(&self, name: &str) -> Result<&HValue> {
		self.keywords
			.get(&name.to_ascii_lowercase())
			.ok_or_else(|| Error::InvalidKeyword(format!("{}:{name}", self.series)))
	}

	pub fn set_keyword(&mut self, name: &str, value: HValue) -> Result<()> {
		if self.readonly {
			return Err(Error::CommitReadOnly);
		}
		let name = name.to_ascii_lowercase();
		let def = self.template.keyword(&name)?;
		if def.is_constant || def.is_linked() {
			return Err(Error::InvalidKeyword(format!("{}:{name} is not writable", self.series)));
		}
		if value.htype() != def.ty {
			return Err(Error::InvalidData(format!(
				"keyword '{name}' expects {}, got {}",
				def.ty,
				value.htype()
			)));
		}
		self.keywords.insert(name, value);
		Ok(())
	}

	/// Keyword value widened to i64; strings parse if they hold an
	/// integer.
	pub fn key_i64(&self, name: &str) -> Result<i64> {
		let value = self.keyword(name)?;
		if let Some(v) = value.as_i64() {
			return Ok(v);
		}
		if let Some(v) = value.as_f64() {
			return Ok(v as i64);
		}
		value
			.as_str()
			.and_then(|s| s.trim().parse().ok())
			.ok_or_else(|| Error::InvalidData(format!("keyword '{name}' does not convert to an integer")))
	}

	/// Keyword value widened to f64; times yield their internal seconds.
	pub fn key_f64(&self, name: &str) -> Result<f64> {
		let value = self.keyword(name)?;
		if let Some(v) = value.as_f64() {
			return Ok(v);
		}
		value
			.as_str()
			.and_then(|s| s.trim().parse().ok())
			.ok_or_else(|| Error::InvalidData(format!("keyword '{name}' does not convert to a float")))
	}

	/// Keyword value rendered as text (times in calendar form).
	pub fn key_string(&self, name: &str) -> Result<String> {
		Ok(self.keyword(name)?.to_string())
	}

	/// Keyword value as seconds of the catalog's time scale.
	pub fn key_time(&self, name: &str) -> Result<f64> {
		match self.keyword(name)? {
			HValue::Time(v) => Ok(*v),
			HValue::String(s) => heliodb_type::time::parse(s),
			other => other.as_f64().ok_or_else(|| {
				Error::InvalidData(format!("keyword '{name}' does not convert to a time"))
			}),
		}
	}

	pub fn link(&self, name: &str) -> Result<&LinkInstance> {
		self.links
			.get(&name.to_ascii_lowercase())
			.ok_or_else(|| Error::UnknownLink(format!("{}:{name}", self.series)))
	}

	pub fn segment(&self, name: &str) -> Result<&SegmentInstance> {
		self.segments
			.get(&name.to_ascii_lowercase())
			.ok_or_else(|| Error::NoSegment(format!("{}:{name}", self.series)))
	}

	/// Directory holding this record's segment files. Requires the unit
	/// to have been staged online first.
	pub fn directory(&self) -> Result<PathBuf> {
		if self.sunum < 0 {
			return Err(Error::NoSegment(format!("{}:{} has no storage unit", self.series, self.recnum)));
		}
		let dir = self.su_dir.as_ref().ok_or(Error::NeedStorage)?;
		if self.slotnum >= 0 {
			Ok(dir.join(format!("S{:05}", self.slotnum)))
		} else {
			Ok(dir.clone())
		}
	}
}

pub fn cache_key(series: &str, recnum: i64) -> String {
	format!("{series}:{recnum}")
}
