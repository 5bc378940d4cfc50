// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! SQL synthesis: translation of parsed sub-specs into catalog queries,
//! optionally routed through the per-series shadow summary table.

pub use builder::{BuiltQuery, QueryKind, QueryRequest, build};
pub use fragments::{FirstLast, PkPred, PredRhs, WhereFragments, assemble};
pub use shadow::{ShadowMemo, ensure_shadow, shadow_table_name};

pub mod builder;
pub mod fragments;
pub mod shadow;

pub use heliodb_type::{Error, Result};

/// Statement separator between a temp-table preamble and the selection that
/// uses it; the executor splits here and runs the parts in order.
pub const STATEMENT_SEPARATOR: &str = ";\n";
