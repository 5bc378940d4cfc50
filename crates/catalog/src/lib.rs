// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! The per-series schema catalog.
//!
//! Series templates are materialized lazily on first touch from the catalog
//! tables (`admin.ns`, `{ns}.drms_series`, `{ns}.drms_segment`,
//! `{ns}.drms_link`, `{ns}.drms_keyword`) and are immutable for the process
//! lifetime afterwards.

pub use keyword::{KeywordDef, KwFlags};
pub use link::{LinkDef, LinkKind};
pub use segment::{SegScope, SegmentDef};
pub use series::{SeriesInfo, SeriesVersion, ShadowState};
pub use template::{SeriesTemplate, TemplateCatalog, split_namespace};

pub mod keymap;
pub mod keyword;
pub mod link;
pub mod segment;
pub mod series;
pub mod template;

pub use heliodb_type::{Error, Result};
