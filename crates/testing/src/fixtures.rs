// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Ready-made series templates.
//!
//! `aia.lev1` is a slotted two-key observation series; `cal.pair` carries a
//! static and a dynamic link into `cal.dark` and `cal.flat`.

use heliodb_catalog::{
	KeywordDef, LinkDef, LinkKind, SegScope, SegmentDef, SeriesInfo, SeriesTemplate, SeriesVersion,
	ShadowState,
};
use heliodb_type::{HType, HValue};
use indexmap::IndexMap;

fn info(name: &str, pidx: &[&str]) -> SeriesInfo {
	SeriesInfo {
		name: name.to_string(),
		description: String::new(),
		author: "fixtures".into(),
		owner: "production".into(),
		unitsize: 32,
		archive: true,
		retention: 10000,
		tapegroup: 1,
		version: SeriesVersion {
			major: 2,
			minor: 1,
		},
		pidx: pidx.iter().map(|s| s.to_string()).collect(),
		dbidx: Vec::new(),
		shadow: ShadowState::Unknown,
	}
}

fn kw(name: &str, rank: usize, ty: HType) -> KeywordDef {
	KeywordDef {
		name: name.to_string(),
		rank,
		ty,
		format: match ty {
			HType::String => "%s".into(),
			HType::Float | HType::Double | HType::Time => "%g".into(),
			_ => "%d".into(),
		},
		unit: "none".into(),
		description: String::new(),
		default: ty.missing(),
		is_constant: false,
		is_prime: false,
		is_external_prime: false,
		per_segment: false,
		link: None,
		target_key: None,
	}
}

fn seg(name: &str, segnum: usize, scope: SegScope, ty: HType, axis: &[i32]) -> SegmentDef {
	SegmentDef {
		name: name.to_string(),
		segnum,
		scope,
		ty,
		naxis: axis.len(),
		axis: axis.to_vec(),
		unit: "DN".into(),
		protocol: "fits".into(),
		description: String::new(),
		cparms: None,
		bzero: 0.0,
		bscale: 1.0,
		link: None,
		target_seg: None,
	}
}

fn keyword_map(defs: Vec<KeywordDef>) -> IndexMap<String, KeywordDef> {
	defs.into_iter().map(|d| (d.name.clone(), d)).collect()
}

fn segment_map(defs: Vec<SegmentDef>) -> IndexMap<String, SegmentDef> {
	defs.into_iter().map(|d| (d.name.clone(), d)).collect()
}

/// A slotted series: primary index `(t_obs_index, wavelnth)` where
/// `t_obs_index` slots `t_obs` at 45-second cadence from epoch zero.
pub fn lev1_template() -> SeriesTemplate {
	let mut t_obs = kw("t_obs", 0, HType::Time);
	t_obs.is_external_prime = true;

	let mut t_obs_index = kw("t_obs_index", 1, HType::LongLong);
	t_obs_index.is_prime = true;

	let mut t_obs_epoch = kw("t_obs_epoch", 2, HType::Time);
	t_obs_epoch.is_constant = true;
	t_obs_epoch.default = HValue::Time(0.0);

	let mut t_obs_step = kw("t_obs_step", 3, HType::Double);
	t_obs_step.is_constant = true;
	t_obs_step.default = HValue::Double(45.0);

	let mut wavelnth = kw("wavelnth", 4, HType::Int);
	wavelnth.is_prime = true;
	wavelnth.is_external_prime = true;

	SeriesTemplate {
		info: info("aia.lev1", &["t_obs_index", "wavelnth"]),
		keywords: keyword_map(vec![
			t_obs,
			t_obs_index,
			t_obs_epoch,
			t_obs_step,
			wavelnth,
			kw("camera", 5, HType::String),
			kw("quality", 6, HType::Int),
			kw("exptime", 7, HType::Double),
		]),
		links: IndexMap::new(),
		segments: segment_map(vec![
			seg("image", 0, SegScope::Variable, HType::Float, &[4096, 4096]),
			seg("spikes", 1, SegScope::VarDim, HType::Int, &[0]),
		]),
	}
}

/// Dynamic-link target keyed `(t, wavelength)`.
pub fn flat_template() -> SeriesTemplate {
	let mut t = kw("t", 0, HType::Time);
	t.is_prime = true;
	t.is_external_prime = true;
	let mut wavelength = kw("wavelength", 1, HType::Int);
	wavelength.is_prime = true;
	wavelength.is_external_prime = true;

	SeriesTemplate {
		info: info("cal.flat", &["t", "wavelength"]),
		keywords: keyword_map(vec![t, wavelength, kw("coef", 2, HType::Double)]),
		links: IndexMap::new(),
		segments: segment_map(vec![seg(
			"flatfield",
			0,
			SegScope::Variable,
			HType::Float,
			&[1024, 1024],
		)]),
	}
}

/// Static-link target.
pub fn dark_template() -> SeriesTemplate {
	let mut fsn = kw("fsn", 0, HType::LongLong);
	fsn.is_prime = true;
	fsn.is_external_prime = true;

	SeriesTemplate {
		info: info("cal.dark", &["fsn"]),
		keywords: keyword_map(vec![fsn, kw("t_exp", 1, HType::Double)]),
		links: IndexMap::new(),
		segments: segment_map(vec![seg("dark", 0, SegScope::Variable, HType::Float, &[1024, 1024])]),
	}
}

/// Source series carrying one static link (`sdark` → cal.dark) and one
/// dynamic link (`dflat` → cal.flat), a linked keyword, and a linked
/// segment through the static link.
pub fn pair_template() -> SeriesTemplate {
	let mut fsn = kw("fsn", 0, HType::LongLong);
	fsn.is_prime = true;
	fsn.is_external_prime = true;

	let mut flat_coef = kw("flat_coef", 2, HType::Double);
	flat_coef.link = Some("dflat".into());
	flat_coef.target_key = Some("coef".into());

	let sdark = LinkDef {
		name: "sdark".into(),
		rank: 0,
		kind: LinkKind::Static,
		target_series: "cal.dark".into(),
		description: String::new(),
		target_pidx_names: vec!["fsn".into()],
		target_pidx_types: vec![HType::LongLong],
	};
	let dflat = LinkDef {
		name: "dflat".into(),
		rank: 1,
		kind: LinkKind::Dynamic,
		target_series: "cal.flat".into(),
		description: String::new(),
		target_pidx_names: vec!["t".into(), "wavelength".into()],
		target_pidx_types: vec![HType::Time, HType::Int],
	};

	let mut darkseg = seg("darkseg", 1, SegScope::Variable, HType::Float, &[1024, 1024]);
	darkseg.link = Some("sdark".into());
	darkseg.target_seg = Some("dark".into());

	SeriesTemplate {
		info: info("cal.pair", &["fsn"]),
		keywords: keyword_map(vec![fsn, kw("temp", 1, HType::Double), flat_coef]),
		links: [("sdark".to_string(), sdark), ("dflat".to_string(), dflat)].into_iter().collect(),
		segments: segment_map(vec![
			seg("resid", 0, SegScope::Variable, HType::Float, &[64, 64]),
			darkseg,
		]),
	}
}
