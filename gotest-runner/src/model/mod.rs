// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test item model: workspaces, modules, packages, files and test cases.
//!
//! The model is a tree of plain values stored in [`ItemSet`](crate::item_set::ItemSet)s. Every
//! mutation goes through reconciliation against discovery records and reports what changed as a
//! list of [`ItemEvent`]s. Objects whose key survives a reconciliation are updated in place, so
//! their [`InstanceId`] stays the same.
//!
//! Nesting that is derived from names (packages within packages, subtests within tests) is not
//! stored on the items: it lives in [`RelationMap`](crate::relation_map::RelationMap)s that are
//! rebuilt whenever the underlying flat set changes.

mod events;
mod file;
mod id;
mod package;
mod root;
mod test_case;

pub use events::*;
pub use file::*;
pub use id::*;
pub use package::*;
pub use root::*;
pub use test_case::*;

use crate::{
    config::ExcludeGlobs,
    errors::DiscoveryError,
    helpers::{path_to_uri, same_dir_uri, uri_is_within},
    item_set::{ItemSet, SetMember},
};
use camino::Utf8Path;
use gotest_metadata::{ModuleRecord, PackageRecord, Range};
use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use smol_str::SmolStr;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::debug;

/// The default maximum number of dynamic subtests created under a single parent.
pub const DEFAULT_DYNAMIC_SUBTEST_LIMIT: usize = 50;

/// The identity of a particular model object.
///
/// Two objects with equal keys but different instances are different objects: one replaced the
/// other. Reconciliation never replaces an object whose key survived.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The kind for [`RunId`].
pub enum TestRunKind {}

impl TypedUuidKind for TestRunKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("test_run");
        TAG
    }
}

/// The unique identifier of a test run. Dynamic tests are owned by the run that created them.
pub type RunId = TypedUuid<TestRunKind>;

/// Ranges edited in each file since the last reconciliation.
#[derive(Clone, Debug, Default)]
pub struct FileEdits {
    ranges: HashMap<SmolStr, Vec<Range>>,
}

impl FileEdits {
    /// Creates an empty set of edits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records edited ranges for a file.
    pub fn add(&mut self, uri: &str, ranges: impl IntoIterator<Item = Range>) {
        self.ranges.entry(uri.into()).or_default().extend(ranges);
    }

    /// Returns the edited ranges for a file.
    pub fn for_file(&self, uri: &str) -> &[Range] {
        self.ranges.get(uri).map_or(&[], Vec::as_slice)
    }
}

/// Which packages a package update is authoritative for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpdateScope {
    /// The records describe every package under the workspace: unreported packages are removed.
    Full,

    /// The records describe only the packages they mention: unreported packages are kept.
    Reported,
}

/// Options that affect how the model is built.
#[derive(Clone, Debug)]
pub struct ModelOptions {
    /// Test files matching these globs are ignored.
    pub exclude: ExcludeGlobs,

    /// The maximum number of dynamic subtests created under a single parent.
    pub dynamic_subtest_limit: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            exclude: ExcludeGlobs::default(),
            dynamic_subtest_limit: DEFAULT_DYNAMIC_SUBTEST_LIMIT,
        }
    }
}

/// A borrowed item found in the model, along with its ancestry.
#[derive(Copy, Clone, Debug)]
pub enum ModelItem<'a> {
    /// A workspace.
    Workspace(&'a Workspace),

    /// A module.
    Module(&'a Module),

    /// A package.
    Package(PackageRef<'a>),

    /// A test file.
    File(FileRef<'a>),

    /// A test case.
    Test(TestRef<'a>),
}

/// A package and the root that owns it.
#[derive(Copy, Clone, Debug)]
pub struct PackageRef<'a> {
    /// The owning root.
    pub root: RootRef<'a>,

    /// The package.
    pub package: &'a Package,
}

/// A test file, its package and the root that owns it.
#[derive(Copy, Clone, Debug)]
pub struct FileRef<'a> {
    /// The owning root.
    pub root: RootRef<'a>,

    /// The owning package.
    pub package: &'a Package,

    /// The file.
    pub file: &'a TestFile,
}

/// A test case, its package and the root that owns it.
#[derive(Copy, Clone, Debug)]
pub struct TestRef<'a> {
    /// The owning root.
    pub root: RootRef<'a>,

    /// The owning package.
    pub package: &'a Package,

    /// The test case.
    pub test: &'a TestCase,
}

/// The test item model.
#[derive(Clone, Debug, Default)]
pub struct TestModel {
    workspaces: ItemSet<Workspace>,
    options: ModelOptions,
}

impl TestModel {
    /// Creates an empty model.
    pub fn new(options: ModelOptions) -> Self {
        Self {
            workspaces: ItemSet::new(),
            options,
        }
    }

    /// Returns the model options.
    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Returns the workspaces, in the order they were added.
    pub fn workspaces(&self) -> &ItemSet<Workspace> {
        &self.workspaces
    }

    /// Iterates over every root: each workspace followed by its modules.
    pub fn roots(&self) -> impl Iterator<Item = RootRef<'_>> + '_ {
        self.workspaces.iter().flat_map(Workspace::roots)
    }

    /// Iterates over every package in every root.
    pub fn packages(&self) -> impl Iterator<Item = PackageRef<'_>> + '_ {
        self.roots().flat_map(|root| {
            root.packages()
                .iter()
                .map(move |package| PackageRef { root, package })
        })
    }

    /// Adds a workspace rooted at `dir`. Adding an existing workspace is a no-op.
    pub fn add_workspace(&mut self, dir: &Utf8Path) -> Result<ItemId, DiscoveryError> {
        let dir_uri = path_to_uri(dir).ok_or_else(|| DiscoveryError::InvalidWorkspaceDir {
            dir: dir.to_owned(),
        })?;
        let workspace = Workspace::new(dir.to_owned(), dir_uri);
        let id = workspace.id();
        if self.workspaces.add(workspace).is_err() {
            debug!(%id, "workspace already present");
        }
        Ok(id)
    }

    /// Removes a workspace and everything under it.
    pub fn remove_workspace(&mut self, id: &ItemId) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        if let Some(workspace) = self.workspaces.remove(id.uri()) {
            workspace.removed_events(&mut events);
        }
        events
    }

    /// Reconciles a workspace's modules against discovery results.
    pub fn update_modules(&mut self, workspace: &ItemId, modules: &[ModuleRecord]) -> Vec<ItemEvent> {
        let Some(ws) = self.workspaces.get_mut(workspace.uri()) else {
            return Vec::new();
        };
        ws.modules
            .update(modules, Module::new, |record, module| module.update(record), |_| false)
    }

    /// Reconciles a workspace's packages against discovery results.
    ///
    /// Records are consolidated, then each package is assigned to the module whose path it
    /// reports (or, failing that, the innermost module whose directory contains it), or to the
    /// workspace itself. `edits` decides between `Modified` and `Moved` for tests that changed.
    pub fn update_packages(
        &mut self,
        workspace: &ItemId,
        records: &[PackageRecord],
        scope: UpdateScope,
        edits: &FileEdits,
    ) -> Vec<ItemEvent> {
        let groups = consolidate(records, &self.options.exclude);
        let Some(ws) = self.workspaces.get_mut(workspace.uri()) else {
            return Vec::new();
        };

        let mut ws_groups: Vec<&PackageGroup> = Vec::new();
        let mut module_groups: HashMap<SmolStr, Vec<&PackageGroup>> = HashMap::new();
        for group in &groups {
            match module_for(ws, group) {
                Some(path) => module_groups
                    .entry(SmolStr::from(path))
                    .or_default()
                    .push(group),
                None => ws_groups.push(group),
            }
        }

        let reported: HashSet<&str> = groups.iter().map(PackageGroup::path).collect();
        let keep = |package: &Package| {
            scope == UpdateScope::Reported && !reported.contains(package.path())
        };

        let mut events = ws.update_packages(ws_groups.iter().copied(), edits, keep);
        for module in ws.modules.iter_mut() {
            let groups = module_groups
                .get(module.path())
                .map(Vec::as_slice)
                .unwrap_or_default();
            events.extend(module.update_packages(groups.iter().copied(), edits, keep));
        }

        debug!(
            workspace = %workspace,
            packages = groups.len(),
            events = events.len(),
            "reconciled packages",
        );
        events
    }

    /// Removes a deleted test file from the model.
    pub fn remove_file(&mut self, uri: &str) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        for ws in self.workspaces.iter_mut() {
            events.extend(ws.packages.remove_file(uri));
            for module in ws.modules.iter_mut() {
                events.extend(module.packages.remove_file(uri));
            }
        }
        events
    }

    /// Looks up an item by ID.
    ///
    /// Returns `None` if the item is no longer in the model.
    pub fn find(&self, id: &ItemId) -> Option<ModelItem<'_>> {
        match id.kind() {
            ItemKind::Workspace => self.workspaces.get(id.uri()).map(ModelItem::Workspace),
            ItemKind::Module => self
                .workspaces
                .iter()
                .flat_map(|ws| ws.modules.iter())
                .find(|module| module.go_mod_uri() == id.uri())
                .map(ModelItem::Module),
            ItemKind::Package => self.package(id).map(ModelItem::Package),
            ItemKind::File => {
                let PackageRef { root, package } = self.package_for_file(id.uri())?;
                let file = package.files().get(id.uri())?;
                Some(ModelItem::File(FileRef {
                    root,
                    package,
                    file,
                }))
            }
            ItemKind::Test(kind) => {
                let PackageRef { root, package } = self.package_for_file(id.uri())?;
                let test = package.test(id.name()?)?;
                (test.kind() == kind && test.file_uri() == id.uri()).then_some(ModelItem::Test(
                    TestRef {
                        root,
                        package,
                        test,
                    },
                ))
            }
        }
    }

    /// Looks up a package by ID.
    pub fn package(&self, id: &ItemId) -> Option<PackageRef<'_>> {
        if id.kind() != ItemKind::Package {
            return None;
        }
        self.roots().find_map(|root| {
            root.packages()
                .get_by_dir(id.uri())
                .map(|package| PackageRef { root, package })
        })
    }

    /// Returns the package that contains the test file at `uri`.
    pub fn package_for_file(&self, uri: &str) -> Option<PackageRef<'_>> {
        self.roots().find_map(|root| {
            root.packages()
                .get_by_file(uri)
                .map(|package| PackageRef { root, package })
        })
    }

    /// Finds the test called `name` in a package, creating it (and any missing intermediate
    /// levels) as a dynamic subtest owned by `run_id` if necessary.
    ///
    /// Returns the test's ID, or `None` if it is not a subtest of a known test or the per-parent
    /// limit was reached, along with events for any created tests.
    pub fn make_dynamic_test_case(
        &mut self,
        package: &ItemId,
        name: &str,
        run_id: RunId,
    ) -> (Option<ItemId>, Vec<ItemEvent>) {
        let limit = self.options.dynamic_subtest_limit;
        let mut events = Vec::new();
        let id = self.package_mut(package).and_then(|package| {
            package.make_dynamic_test_case(name, run_id, limit, &mut events)
        });
        (id, events)
    }

    /// Removes the dynamic subtests nested under a test, at any depth.
    pub fn remove_dynamic_test_cases(&mut self, test: &ItemId) -> Vec<ItemEvent> {
        let Some(name) = test.name() else {
            return Vec::new();
        };
        match self.package_for_file_mut(test.uri()) {
            Some(package) => package.remove_dynamic_test_cases(name),
            None => Vec::new(),
        }
    }

    /// Removes every dynamic test created by `run_id`.
    pub fn invalidate_run(&mut self, run_id: RunId) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        for package in self.packages_mut() {
            events.extend(package.remove_run(run_id));
        }
        events
    }

    fn packages_mut(&mut self) -> impl Iterator<Item = &mut Package> + '_ {
        self.workspaces.iter_mut().flat_map(|ws| {
            ws.packages.iter_mut().chain(
                ws.modules
                    .iter_mut()
                    .flat_map(|module| module.packages.iter_mut()),
            )
        })
    }

    fn package_mut(&mut self, id: &ItemId) -> Option<&mut Package> {
        if id.kind() != ItemKind::Package {
            return None;
        }
        self.packages_mut()
            .find(|package| same_dir_uri(package.dir_uri(), id.uri()))
    }

    fn package_for_file_mut(&mut self, uri: &str) -> Option<&mut Package> {
        self.packages_mut()
            .find(|package| package.files().has(uri))
    }
}

/// Picks the module that owns a package group, if any.
fn module_for<'a>(ws: &'a Workspace, group: &PackageGroup) -> Option<&'a str> {
    if let Some(path) = group.module_path() {
        if let Some(module) = ws.modules.get(path) {
            return Some(module.path());
        }
    }
    let dir = group.dir_uri();
    ws.modules
        .iter()
        .filter(|module| uri_is_within(dir, module.dir_uri()))
        .max_by_key(|module| module.dir_uri().len())
        .map(Module::path)
}

/// Returns the longest proper `/`-delimited prefix of `name` that is in `present`.
pub(crate) fn nearest_ancestor<'a>(name: &'a str, present: &HashSet<&str>) -> Option<&'a str> {
    let mut current = name;
    while let Some((prefix, _)) = current.rsplit_once('/') {
        if present.contains(prefix) {
            return Some(prefix);
        }
        current = prefix;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotest_metadata::{Location, TestCaseRecord, TestFileRecord};
    use pretty_assertions::assert_eq;

    const FOO: &str = "file:///src/foo";

    fn test_file(uri: &str, tests: &[(&str, u32, u32)]) -> TestFileRecord {
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

    fn package(path: &str, module: Option<&str>, files: Vec<TestFileRecord>) -> PackageRecord {
        PackageRecord {
            path: path.to_owned(),
            for_test: None,
            module_path: module.map(str::to_owned),
            test_files: files,
        }
    }

    fn module(path: &str, go_mod: &str) -> ModuleRecord {
        ModuleRecord {
            path: path.to_owned(),
            version: None,
            go_mod: go_mod.to_owned(),
        }
    }

    fn fixture() -> (TestModel, ItemId, Vec<PackageRecord>) {
        let mut model = TestModel::default();
        let ws = model
            .add_workspace(Utf8Path::new("/src"))
            .expect("absolute path");
        model.update_modules(&ws, &[module("foo", &format!("{FOO}/go.mod"))]);
        let records = vec![
            package(
                "foo",
                Some("foo"),
                vec![test_file(&format!("{FOO}/foo_test.go"), &[("TestFoo", 2, 6)])],
            ),
            package(
                "foo/bar",
                None,
                vec![test_file(&format!("{FOO}/bar/bar_test.go"), &[("TestBar", 2, 6)])],
            ),
            package(
                "scratch",
                None,
                vec![test_file("file:///src/scratch/s_test.go", &[("TestS", 1, 3)])],
            ),
        ];
        (model, ws, records)
    }

    fn kinds(events: &[ItemEvent]) -> Vec<(ItemEventKind, String)> {
        events
            .iter()
            .map(|event| (event.kind, event.id.to_string()))
            .collect()
    }

    #[test]
    fn packages_are_routed_to_roots() {
        let (mut model, ws, records) = fixture();
        model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());

        let routed: Vec<(String, Vec<&str>)> = model
            .roots()
            .map(|root| {
                (
                    root.id().to_string(),
                    root.packages().iter().map(Package::path).collect(),
                )
            })
            .collect();
        assert_eq!(
            routed,
            vec![
                ("file:///src?workspace".to_owned(), vec!["scratch"]),
                ("file:///src/foo/go.mod?module".to_owned(), vec!["foo", "foo/bar"]),
            ],
            "foo/bar has no module path but lives under the foo module's directory"
        );

        let foo = model
            .package(&ItemId::package(FOO))
            .expect("foo package exists");
        assert!(foo.package.is_root_package());
        assert_eq!(foo.root.id(), ItemId::module(format!("{FOO}/go.mod")));
    }

    #[test]
    fn reconciliation_is_idempotent_and_preserves_identity() {
        let (mut model, ws, mut records) = fixture();
        model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());
        let foo_instance = model
            .package(&ItemId::package(FOO))
            .map(|p| p.package.instance());

        let events = model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());
        assert_eq!(events, vec![]);

        // Drop an unrelated sibling: foo keeps its identity.
        records.pop();
        let events = model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());
        assert_eq!(
            kinds(&events),
            vec![
                (
                    ItemEventKind::Removed,
                    "file:///src/scratch/s_test.go?test#TestS".to_owned()
                ),
                (
                    ItemEventKind::Removed,
                    "file:///src/scratch/s_test.go?file".to_owned()
                ),
                (ItemEventKind::Removed, "file:///src/scratch?package".to_owned()),
            ]
        );
        assert_eq!(
            model
                .package(&ItemId::package(FOO))
                .map(|p| p.package.instance()),
            foo_instance
        );
    }

    #[test]
    fn partial_updates_keep_unreported_packages() {
        let (mut model, ws, records) = fixture();
        model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());

        let mut bar = records[1].clone();
        bar.test_files[0]
            .tests
            .push(test_file(&format!("{FOO}/bar/bar_test.go"), &[("TestBaz", 8, 9)]).tests[0].clone());
        let events = model.update_packages(&ws, &[bar], UpdateScope::Reported, &FileEdits::new());
        assert_eq!(
            kinds(&events),
            vec![(
                ItemEventKind::Added,
                format!("{FOO}/bar/bar_test.go?test#TestBaz")
            )]
        );
        assert_eq!(model.packages().count(), 3);
    }

    #[test]
    fn find_and_remove_file() {
        let (mut model, ws, records) = fixture();
        model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());

        let test_id = ItemId::test(format!("{FOO}/bar/bar_test.go"), TestKind::Test, "TestBar");
        match model.find(&test_id) {
            Some(ModelItem::Test(TestRef { package, test, .. })) => {
                assert_eq!(package.path(), "foo/bar");
                assert_eq!(test.name(), "TestBar");
            }
            other => panic!("expected a test, found {other:?}"),
        }
        // The same name with the wrong kind isn't a match.
        let wrong_kind =
            ItemId::test(format!("{FOO}/bar/bar_test.go"), TestKind::Benchmark, "TestBar");
        assert!(model.find(&wrong_kind).is_none());

        let events = model.remove_file(&format!("{FOO}/bar/bar_test.go"));
        assert_eq!(
            kinds(&events),
            vec![
                (ItemEventKind::Removed, test_id.to_string()),
                (ItemEventKind::Removed, format!("{FOO}/bar/bar_test.go?file")),
                (ItemEventKind::Removed, format!("{FOO}/bar?package")),
            ]
        );
        assert!(model.find(&test_id).is_none());
    }

    #[test]
    fn dynamic_tests_belong_to_their_run() {
        let (mut model, ws, records) = fixture();
        model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());
        let package = ItemId::package(FOO);
        let run_id = RunId::new_v4();

        let (id, events) = model.make_dynamic_test_case(&package, "TestFoo/a", run_id);
        let id = id.expect("created");
        assert_eq!(kinds(&events), vec![(ItemEventKind::Added, id.to_string())]);
        assert!(model.find(&id).is_some());

        let events = model.invalidate_run(RunId::new_v4());
        assert_eq!(events, vec![], "other runs own nothing");

        let events = model.invalidate_run(run_id);
        assert_eq!(kinds(&events), vec![(ItemEventKind::Removed, id.to_string())]);
        assert!(model.find(&id).is_none());
    }

    #[test]
    fn removing_a_workspace_cascades() {
        let (mut model, ws, records) = fixture();
        model.update_packages(&ws, &records, UpdateScope::Full, &FileEdits::new());

        let events = model.remove_workspace(&ws);
        assert_eq!(events.len(), 3 * 3 + 2, "three packages, a module and the workspace");
        assert_eq!(events.last(), Some(&ItemEvent::removed(ws.clone())));
        assert_eq!(model.roots().count(), 0);
    }

    #[test]
    fn nearest_ancestor_skips_missing_levels() {
        let present: HashSet<&str> = ["a", "a/b/c"].into_iter().collect();
        assert_eq!(nearest_ancestor("a/b/c/d", &present), Some("a/b/c"));
        assert_eq!(nearest_ancestor("a/b", &present), Some("a"));
        assert_eq!(nearest_ancestor("a", &present), None);
        assert_eq!(nearest_ancestor("ab/c", &present), None);
    }
}
