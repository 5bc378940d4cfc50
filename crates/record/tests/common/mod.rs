// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

#![allow(dead_code)]

use std::sync::{Arc, Once};

use heliodb_core::{DbType, DbValue, EnvConfig};
use heliodb_record::Env;
use heliodb_testing::{MemoryStorage, ScriptedDb, fixtures};

static TRACING: Once = Once::new();

pub struct Harness {
	pub db: Arc<ScriptedDb>,
	pub storage: Arc<MemoryStorage>,
	pub env: Arc<Env>,
}

pub fn harness(config: EnvConfig) -> Harness {
	TRACING.call_once(|| {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_test_writer()
			.try_init()
			.ok();
	});
	let db = Arc::new(ScriptedDb::new());
	let storage = Arc::new(MemoryStorage::new());
	let env = Env::new(db.clone(), storage.clone(), config).unwrap();
	for template in [
		fixtures::lev1_template(),
		fixtures::pair_template(),
		fixtures::dark_template(),
		fixtures::flat_template(),
	] {
		env.catalog().insert(template);
	}
	Harness {
		db,
		storage,
		env,
	}
}

pub fn lev1_columns() -> Vec<(&'static str, DbType)> {
	vec![
		("recnum", DbType::Int8),
		("sunum", DbType::Int8),
		("slotnum", DbType::Int4),
		("sessionid", DbType::Int8),
		("sessionns", DbType::Text),
		("t_obs", DbType::Double),
		("t_obs_index", DbType::Int8),
		("wavelnth", DbType::Int4),
		("camera", DbType::Text),
		("quality", DbType::Int4),
		("exptime", DbType::Double),
		("sg_000_file", DbType::Text),
		("sg_001_file", DbType::Text),
		("sg_001_axis0", DbType::Int4),
	]
}

/// One full wire row of `aia.lev1`.
pub fn lev1_row(recnum: i64, sunum: i64, wavelnth: i32) -> Vec<DbValue> {
	vec![
		DbValue::Int8(recnum),
		DbValue::Int8(sunum),
		DbValue::Int4(0),
		DbValue::Int8(555),
		DbValue::Text("su_production".into()),
		DbValue::Double(recnum as f64 * 45.0),
		DbValue::Int8(recnum),
		DbValue::Int4(wavelnth),
		DbValue::Text("side_a".into()),
		DbValue::Int4(0),
		DbValue::Double(2.9),
		DbValue::Text("image.fits".into()),
		DbValue::Text("spikes.fits".into()),
		DbValue::Int4(17),
	]
}

pub fn pair_columns() -> Vec<(&'static str, DbType)> {
	vec![
		("recnum", DbType::Int8),
		("sunum", DbType::Int8),
		("slotnum", DbType::Int4),
		("sessionid", DbType::Int8),
		("sessionns", DbType::Text),
		("ln_sdark", DbType::Int8),
		("ln_dflat_isset", DbType::Int4),
		("ln_dflat_t", DbType::Double),
		("ln_dflat_wavelength", DbType::Int4),
		("fsn", DbType::Int8),
		("temp", DbType::Double),
		("sg_000_file", DbType::Text),
	]
}

/// One full wire row of `cal.pair`: a static link target plus optional
/// dynamic link key values.
pub fn pair_row(recnum: i64, sdark_recnum: i64, dflat: Option<(f64, i32)>) -> Vec<DbValue> {
	let (isset, t, wavelength) = match dflat {
		Some((t, w)) => (1, DbValue::Double(t), DbValue::Int4(w)),
		None => (0, DbValue::Null, DbValue::Null),
	};
	vec![
		DbValue::Int8(recnum),
		DbValue::Int8(-1),
		DbValue::Int4(-1),
		DbValue::Int8(555),
		DbValue::Text("su_production".into()),
		DbValue::Int8(sdark_recnum),
		DbValue::Int4(isset),
		t,
		wavelength,
		DbValue::Int8(recnum),
		DbValue::Double(20.5),
		DbValue::Text("resid.fits".into()),
	]
}

pub fn dark_columns() -> Vec<(&'static str, DbType)> {
	vec![
		("recnum", DbType::Int8),
		("sunum", DbType::Int8),
		("slotnum", DbType::Int4),
		("sessionid", DbType::Int8),
		("sessionns", DbType::Text),
		("fsn", DbType::Int8),
		("t_exp", DbType::Double),
		("sg_000_file", DbType::Text),
	]
}

pub fn dark_row(recnum: i64, sunum: i64) -> Vec<DbValue> {
	vec![
		DbValue::Int8(recnum),
		DbValue::Int8(sunum),
		DbValue::Int4(0),
		DbValue::Int8(555),
		DbValue::Text("su_production".into()),
		DbValue::Int8(recnum),
		DbValue::Double(1.5),
		DbValue::Text("dark.fits".into()),
	]
}

pub fn flat_columns() -> Vec<(&'static str, DbType)> {
	vec![
		("recnum", DbType::Int8),
		("sunum", DbType::Int8),
		("slotnum", DbType::Int4),
		("sessionid", DbType::Int8),
		("sessionns", DbType::Text),
		("t", DbType::Double),
		("wavelength", DbType::Int4),
		("coef", DbType::Double),
		("sg_000_file", DbType::Text),
	]
}

pub fn flat_row(recnum: i64, t: f64, wavelength: i32) -> Vec<DbValue> {
	vec![
		DbValue::Int8(recnum),
		DbValue::Int8(-1),
		DbValue::Int4(-1),
		DbValue::Int8(555),
		DbValue::Text("su_production".into()),
		DbValue::Double(t),
		DbValue::Int4(wavelength),
		DbValue::Double(1.01),
		DbValue::Text("flat.fits".into()),
	]
}
