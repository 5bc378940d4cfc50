// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

//! `@file` includes.
//!
//! Each non-empty, non-comment line of the named file is a complete
//! specification of its own; the parser appends every line's sub-specs in
//! order. File names may begin with `~/` or `~user/`.

use std::{fs, path::PathBuf};

use heliodb_type::{Error, Result};

/// Home-directory lookup, injectable for tests.
pub trait HomeLookup {
	/// Home of the named user, or of the calling user when `None`.
	fn home_of(&self, user: Option<&str>) -> Option<PathBuf>;
}

/// Lookup against the process environment and the platform user database.
pub struct SystemHome;

impl HomeLookup for SystemHome {
	fn home_of(&self, user: Option<&str>) -> Option<PathBuf> {
		match user {
			None => std::env::var_os("HOME").map(PathBuf::from),
			Some(name) => passwd_home(name),
		}
	}
}

/// Scan the user database for `name` and return its home directory.
#[cfg(unix)]
fn passwd_home(name: &str) -> Option<PathBuf> {
	let passwd = fs::read_to_string("/etc/passwd").ok()?;
	for line in passwd.lines() {
		let mut fields = line.split(':');
		if fields.next() != Some(name) {
			continue;
		}
		// user:pw:uid:gid:gecos:home:shell
		return fields.nth(4).map(PathBuf::from);
	}
	None
}

#[cfg(not(unix))]
fn passwd_home(_name: &str) -> Option<PathBuf> {
	None
}

/// Expand a leading `~/` or `~user/` and return the resolved path.
pub fn expand_home(path: &str, home: &dyn HomeLookup) -> Result<PathBuf> {
	let Some(rest) = path.strip_prefix('~') else {
		return Ok(PathBuf::from(path));
	};
	let (user, tail) = match rest.split_once('/') {
		Some((user, tail)) => (user, tail),
		None => (rest, ""),
	};
	let base = if user.is_empty() {
		home.home_of(None)
	} else {
		home.home_of(Some(user))
	};
	let base =
		base.ok_or_else(|| Error::InvalidSpec(format!("cannot resolve home directory in '{path}'")))?;
	Ok(if tail.is_empty() { base } else { base.join(tail) })
}

/// Read an include file and return its specification lines, with blank
/// lines and comment lines dropped.
pub fn read_spec_file(name: &str, home: &dyn HomeLookup) -> Result<Vec<String>> {
	let path = expand_home(name.trim(), home)?;
	let text = fs::read_to_string(&path)
		.map_err(|e| Error::InvalidSpec(format!("cannot read include file {}: {e}", path.display())))?;
	Ok(text
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.map(String::from)
		.collect())
}
