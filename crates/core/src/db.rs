// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The named interface to the SQL client library.
//!
//! The engine never opens sockets itself; every statement goes through a
//! [`DbClient`] supplied by the embedding process. Column 0 of every record
//! select is `recnum` (INT8) followed by the fixed prefix and the per-link,
//! per-keyword, per-segment columns in rank order.

use heliodb_type::{Error, HType, HValue, Result};

/// Wire-level column types of the SQL client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
	Char,
	Int2,
	Int4,
	Int8,
	Float,
	Double,
	Text,
}

impl DbType {
	pub fn from_htype(ty: HType) -> Self {
		match ty {
			HType::Char => DbType::Char,
			HType::Short => DbType::Int2,
			HType::Int => DbType::Int4,
			HType::LongLong => DbType::Int8,
			HType::Float => DbType::Float,
			HType::Double | HType::Time => DbType::Double,
			HType::String => DbType::Text,
		}
	}
}

/// One cell of a binary result.
#[derive(Clone, Debug, PartialEq)]
pub enum DbValue {
	Null,
	Char(i8),
	Int2(i16),
	Int4(i32),
	Int8(i64),
	Float(f32),
	Double(f64),
	Text(String),
}

impl DbValue {
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			DbValue::Char(v) => Some(*v as i64),
			DbValue::Int2(v) => Some(*v as i64),
			DbValue::Int4(v) => Some(*v as i64),
			DbValue::Int8(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			DbValue::Float(v) => Some(*v as f64),
			DbValue::Double(v) => Some(*v),
			other => other.as_i64().map(|v| v as f64),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			DbValue::Text(v) => Some(v),
			_ => None,
		}
	}

	/// Convert into the engine scalar a keyword of type `ty` expects.
	/// NULL converts to the type's missing sentinel.
	pub fn to_hvalue(&self, ty: HType) -> Result<HValue> {
		if matches!(self, DbValue::Null) {
			return Ok(ty.missing());
		}
		let mismatch = || {
			Error::BadQueryResult(format!("column value {self:?} does not convert to {ty}"))
		};
		match ty {
			HType::Char => self.as_i64().map(|v| HValue::Char(v as i8)).ok_or_else(mismatch),
			HType::Short => self.as_i64().map(|v| HValue::Short(v as i16)).ok_or_else(mismatch),
			HType::Int => self.as_i64().map(|v| HValue::Int(v as i32)).ok_or_else(mismatch),
			HType::LongLong => self.as_i64().map(HValue::LongLong).ok_or_else(mismatch),
			HType::Float => self.as_f64().map(|v| HValue::Float(v as f32)).ok_or_else(mismatch),
			HType::Double => self.as_f64().map(HValue::Double).ok_or_else(mismatch),
			HType::Time => self.as_f64().map(HValue::Time).ok_or_else(mismatch),
			HType::String => {
				self.as_str().map(|s| HValue::String(s.to_string())).ok_or_else(mismatch)
			}
		}
	}
}

impl From<HValue> for DbValue {
	fn from(value: HValue) -> Self {
		match value {
			HValue::Char(v) => DbValue::Char(v),
			HValue::Short(v) => DbValue::Int2(v),
			HValue::Int(v) => DbValue::Int4(v),
			HValue::LongLong(v) => DbValue::Int8(v),
			HValue::Float(v) => DbValue::Float(v),
			HValue::Double(v) | HValue::Time(v) => DbValue::Double(v),
			HValue::String(v) => DbValue::Text(v),
		}
	}
}

/// One column of a binary result, all rows.
#[derive(Clone, Debug)]
pub struct BinColumn {
	pub name: String,
	pub dtype: DbType,
	pub values: Vec<DbValue>,
}

/// A column-major binary query result.
#[derive(Clone, Debug, Default)]
pub struct BinResult {
	pub columns: Vec<BinColumn>,
	pub num_rows: usize,
}

impl BinResult {
	pub fn num_cols(&self) -> usize {
		self.columns.len()
	}

	pub fn column(&self, col: usize) -> Result<&BinColumn> {
		self.columns
			.get(col)
			.ok_or_else(|| Error::BadQueryResult(format!("missing column {col}")))
	}

	pub fn value(&self, row: usize, col: usize) -> Result<&DbValue> {
		self.column(col)?
			.values
			.get(row)
			.ok_or_else(|| Error::BadQueryResult(format!("missing row {row} of column {col}")))
	}

	/// Column 0 of row `row` as a record number.
	pub fn recnum(&self, row: usize) -> Result<i64> {
		self.value(row, 0)?.as_i64().ok_or_else(|| {
			Error::BadQueryResult(format!("row {row} column 0 is not a record number"))
		})
	}

	/// The single integer a count query returns.
	pub fn scalar_i64(&self) -> Result<i64> {
		if self.num_rows != 1 || self.num_cols() != 1 {
			return Err(Error::BadQueryResult(format!(
				"expected a 1x1 result, got {}x{}",
				self.num_rows,
				self.num_cols()
			)));
		}
		self.value(0, 0)?
			.as_i64()
			.ok_or_else(|| Error::BadQueryResult("count column is not an integer".into()))
	}
}

/// A row-major text query result.
#[derive(Clone, Debug, Default)]
pub struct TextResult {
	pub column_names: Vec<String>,
	pub rows: Vec<Vec<Option<String>>>,
}

impl TextResult {
	pub fn num_rows(&self) -> usize {
		self.rows.len()
	}

	pub fn field(&self, row: usize, col: usize) -> Result<&str> {
		self.rows
			.get(row)
			.and_then(|r| r.get(col))
			.map(|f| f.as_deref().unwrap_or(""))
			.ok_or_else(|| Error::BadQueryResult(format!("missing field ({row}, {col})")))
	}
}

/// The SQL client library. Implementations own connection state, statement
/// preparation, and their own timeouts; calls block the caller.
pub trait DbClient: Send + Sync {
	/// Execute a statement that produces no result.
	fn dms(&self, sql: &str) -> Result<()>;

	/// Execute a selection as a binary result.
	fn query_bin(&self, sql: &str) -> Result<BinResult>;

	/// Execute a selection as a text result.
	fn query_txt(&self, sql: &str) -> Result<TextResult>;

	/// Execute a prepared parameterized statement once per row of `rows`,
	/// array-binding each row's values in order. `types` describes the
	/// placeholder types and must match every row.
	fn execute_prepared(&self, sql: &str, types: &[DbType], rows: &[Vec<DbValue>]) -> Result<()>;

	/// Execute a prepared parameterized selection once, binding `params`.
	fn query_prepared(&self, sql: &str, types: &[DbType], params: &[DbValue]) -> Result<BinResult>;

	/// Escalate the session transaction to writable. Fails with
	/// [`Error::CommitReadOnly`] when the session cannot write.
	fn make_writable(&self) -> Result<()>;

	/// Draw `n` values from the series' record-number sequence.
	fn sequence_next(&self, series: &str, n: usize) -> Result<Vec<i64>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_null_converts_to_missing() {
		let v = DbValue::Null.to_hvalue(HType::Short).unwrap();
		assert_eq!(v, HValue::Short(i16::MIN));
		let v = DbValue::Null.to_hvalue(HType::Double).unwrap();
		assert!(v.is_missing());
	}

	#[test]
	fn test_integer_widening() {
		let v = DbValue::Int4(7).to_hvalue(HType::LongLong).unwrap();
		assert_eq!(v, HValue::LongLong(7));
		let v = DbValue::Int8(7).to_hvalue(HType::Double).unwrap();
		assert_eq!(v, HValue::Double(7.0));
	}

	#[test]
	fn test_text_does_not_convert_to_numeric() {
		assert!(DbValue::Text("x".into()).to_hvalue(HType::Int).is_err());
	}

	#[test]
	fn test_scalar_rejects_shapes() {
		let res = BinResult {
			columns: vec![BinColumn {
				name: "count".into(),
				dtype: DbType::Int8,
				values: vec![DbValue::Int8(3), DbValue::Int8(4)],
			}],
			num_rows: 2,
		};
		assert!(res.scalar_i64().is_err());
	}
}
