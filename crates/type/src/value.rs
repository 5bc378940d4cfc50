// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
	Error, Result,
	time::{self, TIME_MISSING},
};

/// All scalar types a series keyword can carry.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum HType {
	/// A 1-byte signed integer.
	Char,
	/// A 2-byte signed integer.
	Short,
	/// A 4-byte signed integer.
	Int,
	/// An 8-byte signed integer.
	LongLong,
	/// A 4-byte IEEE float.
	Float,
	/// An 8-byte IEEE float.
	Double,
	/// Seconds since the catalog epoch, carried as an 8-byte float.
	Time,
	/// A UTF-8 encoded text.
	String,
}

impl HType {
	/// Parse the type name stored in the keyword catalog table.
	pub fn from_name(name: &str) -> Result<Self> {
		match name.trim().to_ascii_lowercase().as_str() {
			"char" => Ok(HType::Char),
			"short" => Ok(HType::Short),
			"int" => Ok(HType::Int),
			"longlong" => Ok(HType::LongLong),
			"float" => Ok(HType::Float),
			"double" => Ok(HType::Double),
			"time" => Ok(HType::Time),
			"string" => Ok(HType::String),
			other => Err(Error::InvalidData(format!("unknown scalar type '{other}'"))),
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			HType::Char => "char",
			HType::Short => "short",
			HType::Int => "int",
			HType::LongLong => "longlong",
			HType::Float => "float",
			HType::Double => "double",
			HType::Time => "time",
			HType::String => "string",
		}
	}

	/// The SQL column type a keyword of this type occupies in the series
	/// table.
	pub fn sql_type(&self) -> &'static str {
		match self {
			HType::Char | HType::Short => "SMALLINT",
			HType::Int => "INTEGER",
			HType::LongLong => "BIGINT",
			HType::Float => "REAL",
			HType::Double | HType::Time => "DOUBLE PRECISION",
			HType::String => "TEXT",
		}
	}

	/// The sentinel stored when a keyword has no value.
	pub fn missing(&self) -> HValue {
		match self {
			HType::Char => HValue::Char(i8::MIN),
			HType::Short => HValue::Short(i16::MIN),
			HType::Int => HValue::Int(i32::MIN),
			HType::LongLong => HValue::LongLong(i64::MIN),
			HType::Float => HValue::Float(f32::NAN),
			HType::Double => HValue::Double(f64::NAN),
			HType::Time => HValue::Time(TIME_MISSING),
			HType::String => HValue::String(String::new()),
		}
	}

	pub fn is_numeric(&self) -> bool {
		!matches!(self, HType::String)
	}

	/// Bytes one value of this type occupies in a binary result row.
	/// Strings are estimated, for memory budgeting only.
	pub fn row_bytes(&self) -> usize {
		match self {
			HType::Char => 1,
			HType::Short => 2,
			HType::Int | HType::Float => 4,
			HType::LongLong | HType::Double | HType::Time => 8,
			HType::String => 32,
		}
	}
}

impl Display for HType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// A scalar value, represented as a native Rust type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HValue {
	Char(i8),
	Short(i16),
	Int(i32),
	LongLong(i64),
	Float(f32),
	Double(f64),
	Time(f64),
	String(String),
}

impl HValue {
	pub fn htype(&self) -> HType {
		match self {
			HValue::Char(_) => HType::Char,
			HValue::Short(_) => HType::Short,
			HValue::Int(_) => HType::Int,
			HValue::LongLong(_) => HType::LongLong,
			HValue::Float(_) => HType::Float,
			HValue::Double(_) => HType::Double,
			HValue::Time(_) => HType::Time,
			HValue::String(_) => HType::String,
		}
	}

	pub fn is_missing(&self) -> bool {
		match self {
			HValue::Char(v) => *v == i8::MIN,
			HValue::Short(v) => *v == i16::MIN,
			HValue::Int(v) => *v == i32::MIN,
			HValue::LongLong(v) => *v == i64::MIN,
			HValue::Float(v) => v.is_nan(),
			HValue::Double(v) | HValue::Time(v) => v.is_nan(),
			HValue::String(v) => v.is_empty(),
		}
	}

	/// Parse the textual form the catalog stores for keyword defaults.
	pub fn parse(ty: HType, text: &str) -> Result<Self> {
		let text = text.trim();
		if text.is_empty() && ty != HType::String {
			return Ok(ty.missing());
		}
		let bad = |t: &str| Error::InvalidData(format!("cannot parse '{t}' as {ty}"));
		match ty {
			HType::Char => text.parse().map(HValue::Char).map_err(|_| bad(text)),
			HType::Short => text.parse().map(HValue::Short).map_err(|_| bad(text)),
			HType::Int => text.parse().map(HValue::Int).map_err(|_| bad(text)),
			HType::LongLong => text.parse().map(HValue::LongLong).map_err(|_| bad(text)),
			HType::Float => text.parse().map(HValue::Float).map_err(|_| bad(text)),
			HType::Double => text.parse().map(HValue::Double).map_err(|_| bad(text)),
			HType::Time => {
				// Accept either a calendar string or raw seconds.
				if let Ok(secs) = time::parse(text) {
					Ok(HValue::Time(secs))
				} else {
					text.parse().map(HValue::Time).map_err(|_| bad(text))
				}
			}
			HType::String => Ok(HValue::String(text.to_string())),
		}
	}

	/// Render as a SQL literal, quoting and escaping text.
	pub fn sql_literal(&self) -> String {
		match self {
			HValue::Char(v) => v.to_string(),
			HValue::Short(v) => v.to_string(),
			HValue::Int(v) => v.to_string(),
			HValue::LongLong(v) => v.to_string(),
			HValue::Float(v) if v.is_nan() => "'NaN'".to_string(),
			HValue::Float(v) => v.to_string(),
			HValue::Double(v) | HValue::Time(v) if v.is_nan() => "'NaN'".to_string(),
			HValue::Double(v) | HValue::Time(v) => v.to_string(),
			HValue::String(v) => format!("'{}'", v.replace('\'', "''")),
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			HValue::Char(v) => Some(*v as i64),
			HValue::Short(v) => Some(*v as i64),
			HValue::Int(v) => Some(*v as i64),
			HValue::LongLong(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			HValue::Float(v) => Some(*v as f64),
			HValue::Double(v) | HValue::Time(v) => Some(*v),
			other => other.as_i64().map(|v| v as f64),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			HValue::String(v) => Some(v),
			_ => None,
		}
	}
}

impl Display for HValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			HValue::Char(v) => Display::fmt(v, f),
			HValue::Short(v) => Display::fmt(v, f),
			HValue::Int(v) => Display::fmt(v, f),
			HValue::LongLong(v) => Display::fmt(v, f),
			HValue::Float(v) => Display::fmt(v, f),
			HValue::Double(v) => Display::fmt(v, f),
			HValue::Time(v) => f.write_str(&time::format(*v)),
			HValue::String(v) => Display::fmt(v, f),
		}
	}
}
