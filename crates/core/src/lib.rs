// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! Interfaces to the engine's external collaborators and the small shared
//! machinery every component leans on: the SQL client trait with its binary
//! and text result models, the growable SQL string builder, and the
//! process-environment configuration.

pub use config::{EnvConfig, MAX_CHUNK_SIZE};
pub use db::{BinColumn, BinResult, DbClient, DbType, DbValue, TextResult};
pub use sql::SqlBuilder;

pub mod config;
pub mod db;
pub mod sql;

pub use heliodb_type::{Error, Result};
