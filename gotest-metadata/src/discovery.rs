// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records returned by the discovery service.
//!
//! The shapes follow the `modules` and `packages` commands exposed by gopls: field names are
//! PascalCase and URIs are `file://` strings.

use crate::position::Location;
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Arguments to the `modules` query.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModulesQuery {
    /// The directory to search, as a URI.
    pub dir: String,

    /// The maximum directory depth to search. Negative values mean unlimited.
    pub max_depth: i32,
}

/// The result of a `modules` query.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModulesResult {
    /// The modules found.
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

/// A module, identified by its `go.mod` file.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleRecord {
    /// The module path, for example `example.com/foo`.
    pub path: String,

    /// The module version, if any.
    #[serde(default, deserialize_with = "empty_string_as_none", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// The URI of the module's `go.mod` file.
    pub go_mod: String,
}

/// The `Mode` bitfield of a `packages` query.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PackagesMode(pub u32);

impl PackagesMode {
    /// Only package metadata is requested.
    pub const DEFAULT: Self = Self(0);

    /// Test files and the tests within them are requested.
    pub const NEED_TESTS: Self = Self(1);

    /// Returns true if tests were requested.
    pub fn needs_tests(self) -> bool {
        self.0 & Self::NEED_TESTS.0 != 0
    }
}

/// Arguments to the `packages` query.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackagesQuery {
    /// The files or directories to query, as URIs.
    pub files: Vec<String>,

    /// If true, packages in subdirectories of the given directories are included.
    #[serde(default)]
    pub recursive: bool,

    /// What information to return.
    #[serde(default)]
    pub mode: PackagesMode,
}

/// The result of a `packages` query.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackagesResult {
    /// The packages found.
    #[serde(default)]
    pub packages: Vec<PackageRecord>,

    /// Modules referenced by the packages, keyed by module path.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleRecord>,
}

/// A raw package, as reported by the discovery service.
///
/// A package and its external test variant (`foo` and `foo_test`) are reported as separate
/// records, the latter with `ForTest` set to the former's path.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageRecord {
    /// The package import path.
    pub path: String,

    /// If this is a test variant, the import path of the package under test.
    #[serde(default, deserialize_with = "empty_string_as_none", skip_serializing_if = "Option::is_none")]
    pub for_test: Option<String>,

    /// The path of the module containing this package, if any.
    #[serde(default, deserialize_with = "empty_string_as_none", skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,

    /// Test files within the package.
    #[serde(default)]
    pub test_files: Vec<TestFileRecord>,
}

impl PackageRecord {
    /// Returns the path of the logical package this record belongs to: `ForTest` if set, otherwise
    /// `Path`.
    pub fn logical_path(&self) -> &str {
        self.for_test.as_deref().unwrap_or(&self.path)
    }
}

/// A test file, as reported by the discovery service.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestFileRecord {
    /// The file URI.
    #[serde(rename = "URI")]
    pub uri: String,

    /// Tests declared in the file, in declaration order.
    #[serde(default)]
    pub tests: Vec<TestCaseRecord>,
}

/// A test function (or statically-known subtest), as reported by the discovery service.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestCaseRecord {
    /// The full test name, for example `TestFoo` or `TestFoo/bar`.
    pub name: SmolStr,

    /// Where the test is declared.
    #[serde(alias = "Location")]
    pub loc: Location,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, Range};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_packages_result() {
        let input = indoc! {r#"
            {
              "Packages": [
                {
                  "Path": "example.com/foo",
                  "ForTest": "",
                  "ModulePath": "example.com/foo",
                  "TestFiles": [
                    {
                      "URI": "file:///src/foo/foo_test.go",
                      "Tests": [
                        {
                          "Name": "TestFoo",
                          "Loc": {
                            "uri": "file:///src/foo/foo_test.go",
                            "range": {
                              "start": { "line": 4, "character": 0 },
                              "end": { "line": 8, "character": 1 }
                            }
                          }
                        }
                      ]
                    }
                  ]
                },
                {
                  "Path": "example.com/foo_test",
                  "ForTest": "example.com/foo"
                }
              ],
              "Module": {
                "example.com/foo": { "Path": "example.com/foo", "GoMod": "file:///src/foo/go.mod" }
              }
            }
        "#};

        let result: PackagesResult = serde_json::from_str(input).expect("valid JSON");
        assert_eq!(result.packages.len(), 2);

        let foo = &result.packages[0];
        assert_eq!(foo.for_test, None, "empty ForTest is treated as absent");
        assert_eq!(foo.logical_path(), "example.com/foo");
        assert_eq!(
            foo.test_files[0].tests[0].loc.range,
            Range::new(Position::new(4, 0), Position::new(8, 1)),
        );

        let foo_test = &result.packages[1];
        assert_eq!(foo_test.logical_path(), "example.com/foo");
        assert!(foo_test.test_files.is_empty());

        assert_eq!(
            result.module["example.com/foo"].go_mod,
            "file:///src/foo/go.mod"
        );
    }

    #[test]
    fn location_alias() {
        let input = r#"{ "Name": "TestBar", "Location": { "uri": "file:///a_test.go", "range": { "start": { "line": 1, "character": 0 }, "end": { "line": 2, "character": 0 } } } }"#;
        let record: TestCaseRecord = serde_json::from_str(input).expect("valid JSON");
        assert_eq!(record.name, "TestBar");
        assert_eq!(record.loc.range, Range::lines(1, 2));
    }

    #[test]
    fn packages_mode() {
        assert!(PackagesMode::NEED_TESTS.needs_tests());
        assert!(!PackagesMode::DEFAULT.needs_tests());
    }
}
