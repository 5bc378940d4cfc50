// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 HelioDB

use std::{fs, io::Write};

use heliodb_spec::{Filter, SpecKind, parse};

/// Parse and classify a mixed specification with an include file.
#[test]
fn parse_and_classify_with_include() {
	let dir = std::env::temp_dir();
	let list = dir.join(format!("heliodb-list-{}.txt", std::process::id()));
	let mut file = fs::File::create(&list).unwrap();
	writeln!(file, "c.d[!1=1!]").unwrap();
	writeln!(file, "# comment").unwrap();
	drop(file);

	let spec_text = format!("a.b[2010.01.01][?val>3?]{{s1,s2}},@{}", list.display());
	let spec = parse(&spec_text).unwrap();
	fs::remove_file(&list).ok();

	assert_eq!(spec.len(), 2);
	assert!(spec.has_at_file);
	assert!(spec.has_filters);

	let first = &spec.sub_specs[0];
	assert_eq!(first.kind, SpecKind::Drms);
	assert_eq!(first.series, "a.b");
	assert!(!first.all_versions);
	assert_eq!(first.seglist, ["s1", "s2"]);
	assert_eq!(first.filters.len(), 2);
	assert!(matches!(&first.filters[1], Filter::Sql { text, all_versions: false } if text == "val>3"));

	let second = &spec.sub_specs[1];
	assert_eq!(second.kind, SpecKind::Drms);
	assert_eq!(second.series, "c.d");
	assert!(second.all_versions);
}

/// An include file may itself include another file.
#[test]
fn nested_includes() {
	let dir = std::env::temp_dir();
	let pid = std::process::id();
	let inner = dir.join(format!("heliodb-inner-{pid}.txt"));
	let outer = dir.join(format!("heliodb-outer-{pid}.txt"));
	fs::write(&inner, "x.y\n").unwrap();
	fs::write(&outer, format!("a.b\n@{}\n", inner.display())).unwrap();

	let spec = parse(&format!("@{}", outer.display())).unwrap();
	fs::remove_file(&inner).ok();
	fs::remove_file(&outer).ok();

	let names: Vec<&str> = spec.sub_specs.iter().map(|s| s.series.as_str()).collect();
	assert_eq!(names, ["a.b", "x.y"]);
	assert!(spec.has_at_file);
}
