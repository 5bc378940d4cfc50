// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Leaf crate shared by every other HelioDB crate: the scalar type system
//! of the series catalog, calendar-time conversion, and the error taxonomy
//! surfaced to callers.

pub use error::{Error, Result};
pub use value::{HType, HValue};

pub mod error;
pub mod time;
pub mod value;
