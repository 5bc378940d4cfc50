// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The record-set specification parser.
//!
//! A specification string is a delimiter-separated sequence of elements;
//! each element names a series with optional bracket filters and a segment
//! list, a plain file, a legacy-archive or VOTable reference in braces, or
//! an `@file` whose lines are themselves specifications.

pub use atfile::{HomeLookup, SystemHome};
pub use parser::{Parser, parse};
pub use pkfilter::{PkFilter, PkOp};
pub use types::{Filter, RecordSetSpec, SpecKind, SubSpec};

pub mod atfile;
pub mod parser;
pub mod pkfilter;
pub mod types;

pub use heliodb_type::{Error, Result};
