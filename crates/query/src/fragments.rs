// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Assembly of WHERE fragments from a sub-spec's bracket filters.
//!
//! Primary-key predicates stay structured so emitters can qualify their
//! columns when the base table is joined against the shadow table. SQL
//! filters pass through as written and always apply to the base table.

use heliodb_catalog::SeriesTemplate;
use heliodb_spec::{Filter, PkOp, SubSpec};
use heliodb_type::{Error, HValue, Result};

/// A `first`/`last(n)` filter bound to one primary-index column.
#[derive(Clone, Debug, PartialEq)]
pub struct FirstLast {
	pub column: String,
	/// Positive selects the first |n| index values, negative the last.
	pub n: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PredRhs {
	Eq(String),
	Range(String, String),
	In(Vec<String>),
}

/// One structured predicate over a single column.
#[derive(Clone, Debug, PartialEq)]
pub struct PkPred {
	pub column: String,
	pub rhs: PredRhs,
}

impl PkPred {
	/// Render with an optional `alias.` qualifier on the column.
	pub fn render(&self, qualifier: Option<&str>) -> String {
		let col = match qualifier {
			Some(q) => format!("{q}.{}", self.column),
			None => self.column.clone(),
		};
		match &self.rhs {
			PredRhs::Eq(lit) => format!("{col} = {lit}"),
			PredRhs::Range(lo, hi) => format!("{col} >= {lo} AND {col} <= {hi}"),
			PredRhs::In(lits) => format!("{col} IN ({})", lits.join(", ")),
		}
	}
}

/// The classified WHERE material of one sub-spec.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WhereFragments {
	pub pk_preds: Vec<PkPred>,
	/// Conjunction of `[?…?]`/`[!…!]` filter bodies, as written.
	pub npk_where: Option<String>,
	pub first_last: Option<FirstLast>,
	pub all_versions: bool,
}

impl WhereFragments {
	pub fn has_pk(&self) -> bool {
		self.pk_preds.iter().any(|p| p.column != "recnum")
	}

	pub fn has_recnum(&self) -> bool {
		self.pk_preds.iter().any(|p| p.column == "recnum")
	}

	pub fn has_npk(&self) -> bool {
		self.npk_where.is_some()
	}

	pub fn pk_where(&self, qualifier: Option<&str>) -> Option<String> {
		if self.pk_preds.is_empty() {
			return None;
		}
		Some(
			self.pk_preds
				.iter()
				.map(|p| p.render(qualifier))
				.collect::<Vec<_>>()
				.join(" AND "),
		)
	}

	/// Primary-key and SQL conjuncts combined, for queries over the base
	/// table alone.
	pub fn combined_where(&self) -> Option<String> {
		match (self.pk_where(None), &self.npk_where) {
			(Some(pk), Some(npk)) => Some(format!("{pk} AND {npk}")),
			(Some(pk), None) => Some(pk),
			(None, Some(npk)) => Some(npk.clone()),
			(None, None) => None,
		}
	}
}

/// Bind the sub-spec's filters against the series template.
pub fn assemble(template: &SeriesTemplate, sub: &SubSpec) -> Result<WhereFragments> {
	let mut frags = WhereFragments {
		all_versions: sub.all_versions,
		..Default::default()
	};

	// Positional filters bind to the user-visible primary index in order.
	let positions = external_pidx(template);
	let mut next_position = 0usize;

	for filter in &sub.filters {
		match filter {
			Filter::Sql {
				text,
				..
			} => {
				let conjunct = format!("({text})");
				frags.npk_where = Some(match frags.npk_where.take() {
					Some(existing) => format!("{existing} AND {conjunct}"),
					None => conjunct,
				});
			}
			Filter::Pk(pk) => {
				if pk.name.as_deref() == Some("recnum") {
					bind_recnum(&mut frags, &pk.op)?;
					continue;
				}
				let (external, column) = match &pk.name {
					Some(name) => find_named(template, name)?,
					None => {
						let Some(pair) = positions.get(next_position) else {
							return Err(Error::InvalidSpec(format!(
								"more positional filters than primary-index keywords in '{}'",
								sub.raw
							)));
						};
						next_position += 1;
						pair.clone()
					}
				};
				bind_pk(&mut frags, template, &external, &column, &pk.op)?;
			}
		}
	}
	Ok(frags)
}

/// The user-visible primary index as (external keyword, stored column)
/// pairs, in index order. A slotted `<base>_index` member is addressed by
/// its base keyword.
fn external_pidx(template: &SeriesTemplate) -> Vec<(String, String)> {
	template
		.info
		.pidx
		.iter()
		.map(|name| {
			match name.strip_suffix("_index") {
				Some(base) if template.keywords.contains_key(base) => {
					(base.to_string(), name.clone())
				}
				_ => (name.clone(), name.clone()),
			}
		})
		.collect()
}

fn find_named(template: &SeriesTemplate, name: &str) -> Result<(String, String)> {
	for (external, column) in external_pidx(template) {
		if external == name || column == name {
			return Ok((external, column));
		}
	}
	// Non-prime keywords are legal filter targets; they bind as plain
	// column predicates.
	let kw = template.keyword(name)?;
	if !kw.has_column() {
		return Err(Error::InvalidKeyword(format!("{}:{} has no stored column", template.info.name, name)));
	}
	Ok((kw.name.clone(), kw.name.clone()))
}

fn bind_recnum(frags: &mut WhereFragments, op: &PkOp) -> Result<()> {
	let parse = |v: &str| -> Result<String> {
		v.trim()
			.parse::<i64>()
			.map(|n| n.to_string())
			.map_err(|_| Error::InvalidSpec(format!("bad record number '{v}'")))
	};
	let rhs = match op {
		PkOp::Eq(v) => PredRhs::Eq(parse(v)?),
		PkOp::Range(lo, hi) => PredRhs::Range(parse(lo)?, parse(hi)?),
		PkOp::In(vs) => PredRhs::In(vs.iter().map(|v| parse(v)).collect::<Result<_>>()?),
		PkOp::FirstLast(_) => {
			return Err(Error::InvalidSpec("first/last cannot address recnum".into()));
		}
	};
	frags.pk_preds.push(PkPred {
		column: "recnum".into(),
		rhs,
	});
	Ok(())
}

fn bind_pk(
	frags: &mut WhereFragments,
	template: &SeriesTemplate,
	external: &str,
	column: &str,
	op: &PkOp,
) -> Result<()> {
	if let PkOp::FirstLast(n) = op {
		if frags.first_last.is_some() {
			return Err(Error::InvalidSpec("more than one first/last filter".into()));
		}
		frags.first_last = Some(FirstLast {
			column: column.to_string(),
			n: *n,
		});
		return Ok(());
	}

	let convert = |raw: &str| convert_value(template, external, column, raw);
	let rhs = match op {
		PkOp::Eq(v) => PredRhs::Eq(convert(v)?),
		PkOp::Range(lo, hi) => PredRhs::Range(convert(lo)?, convert(hi)?),
		PkOp::In(vs) => PredRhs::In(vs.iter().map(|v| convert(v)).collect::<Result<_>>()?),
		PkOp::FirstLast(_) => unreachable!(),
	};
	frags.pk_preds.push(PkPred {
		column: column.to_string(),
		rhs,
	});
	Ok(())
}

/// Convert one filter value to a SQL literal for the stored column. For a
/// slotted key the external value converts to its slot number through the
/// companion `_epoch`/`_step` keywords.
fn convert_value(template: &SeriesTemplate, external: &str, column: &str, raw: &str) -> Result<String> {
	let kw = template.keyword(external)?;
	let value = HValue::parse(kw.ty, raw)
		.map_err(|_| Error::InvalidSpec(format!("bad value '{raw}' for keyword '{external}'")))?;

	if column != external {
		// Slotted: the stored column is the integer slot index.
		if let Some((epoch, step)) = slot_parameters(template, external) {
			let v = value.as_f64().ok_or_else(|| {
				Error::InvalidSpec(format!("value '{raw}' is not numeric for slotted key '{external}'"))
			})?;
			let slot = ((v - epoch) / step + 0.5).floor() as i64;
			return Ok(slot.to_string());
		}
	}
	Ok(value.sql_literal())
}

/// Epoch and step of a slotted keyword, from its companion keywords'
/// defaults.
fn slot_parameters(template: &SeriesTemplate, base: &str) -> Option<(f64, f64)> {
	let epoch = template.keywords.get(&format!("{base}_epoch"))?.default.as_f64()?;
	let step = template.keywords.get(&format!("{base}_step"))?.default.as_f64()?;
	(step != 0.0).then_some((epoch, step))
}

#[cfg(test)]
mod tests {
	use heliodb_spec::parse;

	use super::*;
	use heliodb_testing::fixtures;

	fn frags_for(spec_text: &str) -> WhereFragments {
		let template = fixtures::lev1_template();
		let spec = parse(spec_text).unwrap();
		assemble(&template, &spec.sub_specs[0]).unwrap()
	}

	#[test]
	fn test_positional_binding_follows_pidx() {
		let frags = frags_for("aia.lev1[2010.01.01][94]");
		assert_eq!(frags.pk_preds.len(), 2);
		assert_eq!(frags.pk_preds[0].column, "t_obs_index");
		assert_eq!(frags.pk_preds[1].column, "wavelnth");
		assert_eq!(frags.pk_preds[1].rhs, PredRhs::Eq("94".into()));
	}

	#[test]
	fn test_slot_conversion() {
		// epoch 0.0, step 45 s; 1977.01.02 is 86400 s → slot 1920.
		let frags = frags_for("aia.lev1[1977.01.02]");
		assert_eq!(frags.pk_preds[0].rhs, PredRhs::Eq("1920".into()));
	}

	#[test]
	fn test_named_binding_by_base_name() {
		let frags = frags_for("aia.lev1[t_obs=1977.01.02]");
		assert_eq!(frags.pk_preds[0].column, "t_obs_index");
	}

	#[test]
	fn test_string_values_are_quoted() {
		let frags = frags_for("aia.lev1[camera=side_a]");
		assert_eq!(frags.pk_preds[0].rhs, PredRhs::Eq("'side_a'".into()));
	}

	#[test]
	fn test_sql_filters_conjoin() {
		let frags = frags_for("aia.lev1[?quality >= 0?][?exptime < 3?]");
		assert_eq!(frags.npk_where.as_deref(), Some("(quality >= 0) AND (exptime < 3)"));
		assert!(!frags.has_pk());
	}

	#[test]
	fn test_recnum_filter() {
		let frags = frags_for("aia.lev1[recnum=17]");
		assert!(frags.has_recnum());
		assert!(!frags.has_pk());
		assert_eq!(frags.pk_where(None).as_deref(), Some("recnum = 17"));
	}

	#[test]
	fn test_first_last_binds_column() {
		let frags = frags_for("aia.lev1[t_obs=first(3)]");
		assert_eq!(
			frags.first_last,
			Some(FirstLast {
				column: "t_obs_index".into(),
				n: 3
			})
		);
	}

	#[test]
	fn test_too_many_positional_filters() {
		let template = fixtures::lev1_template();
		let spec = parse("aia.lev1[1][2][3]").unwrap();
		assert!(assemble(&template, &spec.sub_specs[0]).is_err());
	}

	#[test]
	fn test_qualified_render() {
		let frags = frags_for("aia.lev1[94]");
		// Positional 0 binds t_obs_index; second positional binds wavelnth.
		let frags2 = frags_for("aia.lev1[wavelnth=94]");
		assert_eq!(frags2.pk_where(Some("sh")).as_deref(), Some("sh.wavelnth = 94"));
		assert_eq!(frags.pk_preds[0].column, "t_obs_index");
	}
}
