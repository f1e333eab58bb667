// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ItemIdParseError;
use serde::{Serialize, Serializer};
use smol_str::SmolStr;
use std::{fmt, str::FromStr};

/// The kind of a test function, derived from its name prefix.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TestKind {
    /// `TestXxx`.
    Test,

    /// `BenchmarkXxx`.
    Benchmark,

    /// `FuzzXxx`.
    Fuzz,

    /// `ExampleXxx`.
    Example,
}

impl TestKind {
    /// All test kinds, in the order prefixes are checked.
    pub const ALL: [Self; 4] = [Self::Test, Self::Benchmark, Self::Fuzz, Self::Example];

    /// Returns the function name prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::Benchmark => "Benchmark",
            Self::Fuzz => "Fuzz",
            Self::Example => "Example",
        }
    }

    /// Derives the kind from a test name such as `TestFoo` or `BenchmarkBar/sub`.
    ///
    /// Only the top-level function name is considered. Returns `None` if the name doesn't start
    /// with a known prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let top = name.split('/').next().unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|kind| top.starts_with(kind.prefix()))
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Benchmark => "benchmark",
            Self::Fuzz => "fuzz",
            Self::Example => "example",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of an item exposed to the host view tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ItemKind {
    /// A workspace root directory.
    Workspace,

    /// A module, identified by its `go.mod` file.
    Module,

    /// A package directory.
    Package,

    /// A test file.
    File,

    /// A test case of the given kind.
    Test(TestKind),
}

impl ItemKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Module => "module",
            Self::Package => "package",
            Self::File => "file",
            Self::Test(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "workspace" => Self::Workspace,
            "module" => Self::Module,
            "package" => Self::Package,
            "file" => Self::File,
            "test" => Self::Test(TestKind::Test),
            "benchmark" => Self::Test(TestKind::Benchmark),
            "fuzz" => Self::Test(TestKind::Fuzz),
            "example" => Self::Test(TestKind::Example),
            _ => return Err(()),
        };
        Ok(kind)
    }
}

/// The stable identity of an item exposed to the host view tree.
///
/// The string form is `<uri>?<kind>` for roots, packages and files, and `<uri>?<kind>#<name>` for
/// test cases, where `<uri>` is the URI of the file the test is declared in. Repeated resolutions
/// of the same logical entity always produce equal IDs.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ItemId {
    uri: SmolStr,
    kind: ItemKind,
    name: Option<SmolStr>,
}

impl ItemId {
    /// The ID of a workspace, given the URI of its root directory.
    pub fn workspace(dir_uri: impl Into<SmolStr>) -> Self {
        Self::new(dir_uri, ItemKind::Workspace, None)
    }

    /// The ID of a module, given the URI of its `go.mod` file.
    pub fn module(go_mod_uri: impl Into<SmolStr>) -> Self {
        Self::new(go_mod_uri, ItemKind::Module, None)
    }

    /// The ID of a package, given the URI of its directory.
    pub fn package(dir_uri: impl Into<SmolStr>) -> Self {
        Self::new(dir_uri, ItemKind::Package, None)
    }

    /// The ID of a test file.
    pub fn file(uri: impl Into<SmolStr>) -> Self {
        Self::new(uri, ItemKind::File, None)
    }

    /// The ID of a test case declared in the file at `file_uri`.
    pub fn test(file_uri: impl Into<SmolStr>, kind: TestKind, name: impl Into<SmolStr>) -> Self {
        Self::new(file_uri, ItemKind::Test(kind), Some(name.into()))
    }

    fn new(uri: impl Into<SmolStr>, kind: ItemKind, name: Option<SmolStr>) -> Self {
        Self {
            uri: uri.into(),
            kind,
            name,
        }
    }

    /// Returns the URI part of the ID.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the kind of item.
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// For test cases, returns the full test name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns true if this ID refers to a workspace or module.
    pub fn is_root(&self) -> bool {
        matches!(self.kind, ItemKind::Workspace | ItemKind::Module)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?{}", self.uri, self.kind)?;
        if let Some(name) = &self.name {
            write!(f, "#{name}")?;
        }
        Ok(())
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for ItemId {
    type Err = ItemIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (uri, rest) = s
            .split_once('?')
            .ok_or_else(|| ItemIdParseError::new(s, "missing `?<kind>`"))?;
        if uri.is_empty() {
            return Err(ItemIdParseError::new(s, "empty URI"));
        }
        let (kind, name) = match rest.split_once('#') {
            Some((kind, name)) => (kind, Some(name)),
            None => (rest, None),
        };
        let kind: ItemKind = kind
            .parse()
            .map_err(|()| ItemIdParseError::new(s, format!("unknown kind `{kind}`")))?;

        match (kind, name) {
            (ItemKind::Test(_), Some(name)) if !name.is_empty() => {
                Ok(Self::new(uri, kind, Some(name.into())))
            }
            (ItemKind::Test(_), _) => Err(ItemIdParseError::new(s, "test IDs require a name")),
            (_, Some(_)) => Err(ItemIdParseError::new(
                s,
                format!("{kind} IDs do not take a name"),
            )),
            (_, None) => Ok(Self::new(uri, kind, None)),
        }
    }
}
