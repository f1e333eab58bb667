// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use gotest_metadata::{Location, ModuleRecord, PackageRecord, Range, TestCaseRecord, TestFileRecord};
use gotest_runner::discovery::DiscoverySnapshot;

pub(crate) const FOO: &str = "file:///src/foo";

pub(crate) fn test_file(uri: &str, tests: &[(&str, u32, u32)]) -> TestFileRecord {
    TestFileRecord {
        uri: uri.to_owned(),
        tests: tests
            .iter()
            .map(|(name, start, end)| TestCaseRecord {
                name: (*name).into(),
                loc: Location {
                    uri: uri.to_owned(),
                    range: Range::lines(*start, *end),
                },
            })
            .collect(),
    }
}

pub(crate) fn package(path: &str, files: Vec<TestFileRecord>) -> PackageRecord {
    PackageRecord {
        path: path.to_owned(),
        for_test: None,
        module_path: Some("foo".to_owned()),
        test_files: files,
    }
}

pub(crate) fn foo_module() -> ModuleRecord {
    ModuleRecord {
        path: "foo".to_owned(),
        version: None,
        go_mod: format!("{FOO}/go.mod"),
    }
}

/// Module `foo` with package `foo` (TestFoo) and subpackage `foo/bar` (TestBar).
pub(crate) fn foo_bar_snapshot() -> DiscoverySnapshot {
    DiscoverySnapshot {
        modules: vec![foo_module()],
        packages: vec![
            package(
                "foo",
                vec![test_file(&format!("{FOO}/foo_test.go"), &[("TestFoo", 2, 10)])],
            ),
            package(
                "foo/bar",
                vec![test_file(&format!("{FOO}/bar/bar_test.go"), &[("TestBar", 2, 8)])],
            ),
        ],
    }
}

/// Like [`foo_bar_snapshot`], but `bar_test.go` has been deleted.
pub(crate) fn foo_only_snapshot() -> DiscoverySnapshot {
    let mut snapshot = foo_bar_snapshot();
    snapshot.packages.truncate(1);
    snapshot
}
