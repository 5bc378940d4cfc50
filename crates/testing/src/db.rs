// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! A scripted [`DbClient`].
//!
//! Responses are registered against substring patterns; every issued
//! statement lands in a journal for assertion. A pattern registered more
//! than once yields its responses in registration order with the final
//! response sticky, which covers cursor FETCH sequences that end in an
//! empty batch.

use std::collections::{HashMap, VecDeque};

use heliodb_core::{BinColumn, BinResult, DbClient, DbType, DbValue, TextResult};
use heliodb_type::{Error, Result};
use parking_lot::Mutex;

/// Build a column-major binary result from row-major literals.
pub fn bin_result(cols: &[(&str, DbType)], rows: Vec<Vec<DbValue>>) -> BinResult {
	let num_rows = rows.len();
	let mut columns: Vec<BinColumn> = cols
		.iter()
		.map(|(name, dtype)| BinColumn {
			name: (*name).to_string(),
			dtype: *dtype,
			values: Vec::with_capacity(num_rows),
		})
		.collect();
	for row in rows {
		assert_eq!(row.len(), columns.len(), "scripted row width mismatch");
		for (col, value) in columns.iter_mut().zip(row) {
			col.values.push(value);
		}
	}
	BinResult {
		columns,
		num_rows,
	}
}

pub fn txt_result(cols: &[&str], rows: Vec<Vec<&str>>) -> TextResult {
	TextResult {
		column_names: cols.iter().map(|c| (*c).to_string()).collect(),
		rows: rows
			.into_iter()
			.map(|row| row.into_iter().map(|f| Some(f.to_string())).collect())
			.collect(),
	}
}

struct Scripts<T> {
	entries: Vec<(String, VecDeque<T>)>,
}

impl<T> Default for Scripts<T> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
		}
	}
}

impl<T: Clone> Scripts<T> {
	fn register(&mut self, pattern: &str, response: T) {
		if let Some((_, queue)) = self.entries.iter_mut().find(|(p, _)| p == pattern) {
			queue.push_back(response);
		} else {
			self.entries.push((pattern.to_string(), VecDeque::from([response])));
		}
	}

	fn respond(&mut self, sql: &str) -> Option<T> {
		let (_, queue) = self.entries.iter_mut().find(|(p, _)| sql.contains(p.as_str()))?;
		if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
	}
}

#[derive(Default)]
pub struct ScriptedDb {
	journal: Mutex<Vec<String>>,
	bin: Mutex<Scripts<BinResult>>,
	txt: Mutex<Scripts<TextResult>>,
	errors: Mutex<Scripts<Error>>,
	prepared: Mutex<Vec<(String, Vec<Vec<DbValue>>)>>,
	sequences: Mutex<HashMap<String, i64>>,
	writable: Mutex<bool>,
	refuse_writes: Mutex<bool>,
}

impl ScriptedDb {
	pub fn new() -> Self {
		Self::default()
	}

	/// Respond to statements containing `pattern` with a binary result.
	pub fn on_bin(&self, pattern: &str, result: BinResult) -> &Self {
		self.bin.lock().register(pattern, result);
		self
	}

	/// Respond to statements containing `pattern` with a text result.
	pub fn on_txt(&self, pattern: &str, result: TextResult) -> &Self {
		self.txt.lock().register(pattern, result);
		self
	}

	/// Fail statements containing `pattern`.
	pub fn on_error(&self, pattern: &str, error: Error) -> &Self {
		self.errors.lock().register(pattern, error);
		self
	}

	/// Make `make_writable` fail with `CommitReadOnly`.
	pub fn refuse_writes(&self) -> &Self {
		*self.refuse_writes.lock() = true;
		self
	}

	pub fn journal(&self) -> Vec<String> {
		self.journal.lock().clone()
	}

	pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
		self.journal.lock().iter().filter(|s| s.contains(pattern)).cloned().collect()
	}

	/// Rows handed to `execute_prepared`, per call.
	pub fn prepared_batches(&self, pattern: &str) -> Vec<(String, Vec<Vec<DbValue>>)> {
		self.prepared.lock().iter().filter(|(s, _)| s.contains(pattern)).cloned().collect()
	}

	pub fn is_writable(&self) -> bool {
		*self.writable.lock()
	}

	fn record(&self, sql: &str) -> Result<()> {
		self.journal.lock().push(sql.to_string());
		if let Some(err) = self.errors.lock().respond(sql) {
			return Err(err);
		}
		Ok(())
	}
}

impl DbClient for ScriptedDb {
	fn dms(&self, sql: &str) -> Result<()> {
		self.record(sql)
	}

	fn query_bin(&self, sql: &str) -> Result<BinResult> {
		self.record(sql)?;
		Ok(self.bin.lock().respond(sql).unwrap_or_default())
	}

	fn query_txt(&self, sql: &str) -> Result<TextResult> {
		self.record(sql)?;
		Ok(self.txt.lock().respond(sql).unwrap_or_default())
	}

	fn execute_prepared(&self, sql: &str, types: &[DbType], rows: &[Vec<DbValue>]) -> Result<()> {
		self.record(sql)?;
		for row in rows {
			if row.len() != types.len() {
				return Err(Error::BadDbQuery(format!(
					"prepared row width {} does not match {} placeholder types",
					row.len(),
					types.len()
				)));
			}
		}
		self.prepared.lock().push((sql.to_string(), rows.to_vec()));
		Ok(())
	}

	fn query_prepared(&self, sql: &str, types: &[DbType], params: &[DbValue]) -> Result<BinResult> {
		self.record(sql)?;
		if params.len() != types.len() {
			return Err(Error::BadDbQuery(format!(
				"prepared parameter count {} does not match {} placeholder types",
				params.len(),
				types.len()
			)));
		}
		self.prepared.lock().push((sql.to_string(), vec![params.to_vec()]));
		Ok(self.bin.lock().respond(sql).unwrap_or_default())
	}

	fn make_writable(&self) -> Result<()> {
		if *self.refuse_writes.lock() {
			return Err(Error::CommitReadOnly);
		}
		*self.writable.lock() = true;
		Ok(())
	}

	fn sequence_next(&self, series: &str, n: usize) -> Result<Vec<i64>> {
		let mut sequences = self.sequences.lock();
		let counter = sequences.entry(series.to_string()).or_insert(0);
		let start = *counter + 1;
		*counter += n as i64;
		Ok((start..start + n as i64).collect())
	}
}
