// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    FileEdits, InstanceId, ItemEvent, ItemEventKind, ItemId, ItemKind, RunId, TestCase, TestFile,
    nearest_ancestor,
};
use crate::{
    config::ExcludeGlobs,
    helpers::{parent_uri, same_dir_uri},
    item_set::{ItemSet, Keyed, SetMember},
    relation_map::RelationMap,
};
use gotest_metadata::{PackageRecord, TestFileRecord};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashSet;
use tracing::debug;

/// One logical package: the consolidation of every raw record that shares its test files.
///
/// Produced by [`consolidate`]. `files` is never empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageGroup {
    path: SmolStr,
    module_path: Option<SmolStr>,
    files: Vec<TestFileRecord>,
}

impl PackageGroup {
    /// Returns the logical import path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path of the containing module, as reported by discovery.
    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    /// Returns the merged test files.
    pub fn files(&self) -> &[TestFileRecord] {
        &self.files
    }

    /// Returns the URI of the package directory: the directory of the first test file.
    pub fn dir_uri(&self) -> &str {
        self.files.first().map_or("", |file| parent_uri(&file.uri))
    }
}

impl Keyed for PackageGroup {
    fn key(&self) -> &str {
        &self.path
    }
}

/// Merges raw package records into one group per logical package.
///
/// Records are grouped by `ForTest`, or `Path` if that is absent, so that `foo` and its external
/// test variant `foo_test` become a single package `foo`. Files matching `exclude` are dropped
/// before grouping. A file reported by more than one record is merged, keeping the first record's
/// copy of each test. Groups left without files are dropped. Output order follows the first
/// appearance of each logical path.
pub fn consolidate(records: &[PackageRecord], exclude: &ExcludeGlobs) -> Vec<PackageGroup> {
    let mut groups: IndexMap<&str, PackageGroup> = IndexMap::new();

    for record in records {
        let path = record.logical_path();
        let group = groups.entry(path).or_insert_with(|| PackageGroup {
            path: path.into(),
            module_path: None,
            files: Vec::new(),
        });
        if group.module_path.is_none() {
            group.module_path = record.module_path.as_deref().map(SmolStr::from);
        }

        for file in &record.test_files {
            if exclude.is_excluded(&file.uri) {
                debug!(uri = %file.uri, "excluding test file");
                continue;
            }
            match group.files.iter_mut().find(|existing| existing.uri == file.uri) {
                Some(existing) => {
                    for test in &file.tests {
                        if !existing.tests.iter().any(|t| t.name == test.name) {
                            existing.tests.push(test.clone());
                        }
                    }
                }
                None => group.files.push(file.clone()),
            }
        }
    }

    groups
        .into_values()
        .filter(|group| !group.files.is_empty())
        .collect()
}

/// A package directory containing test files.
#[derive(Clone, Debug)]
pub struct Package {
    instance: InstanceId,
    path: SmolStr,
    module_path: Option<SmolStr>,
    dir_uri: SmolStr,
    is_root_package: bool,
    files: ItemSet<TestFile>,
    subtests: RelationMap<SmolStr>,
}

impl Package {
    pub(crate) fn new(group: &PackageGroup, root_dir_uri: &str) -> Self {
        let mut files = ItemSet::new();
        files.update(group.files(), TestFile::new, |_, _| Vec::new(), |_| false);
        let mut package = Self {
            instance: InstanceId::next(),
            path: group.path.clone(),
            module_path: group.module_path.clone(),
            dir_uri: group.dir_uri().into(),
            is_root_package: same_dir_uri(group.dir_uri(), root_dir_uri),
            files,
            subtests: RelationMap::new(),
        };
        package.rebuild_subtests();
        package
    }

    /// Returns the stable ID of this package.
    pub fn id(&self) -> ItemId {
        ItemId::package(self.dir_uri.clone())
    }

    /// Returns the identity of this particular object.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns the import path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path of the containing module, as last reported by discovery.
    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    /// Returns the URI of the package directory.
    pub fn dir_uri(&self) -> &str {
        &self.dir_uri
    }

    /// Returns true if this package's directory is its root's directory.
    pub fn is_root_package(&self) -> bool {
        self.is_root_package
    }

    /// Returns the test files.
    pub fn files(&self) -> &ItemSet<TestFile> {
        &self.files
    }

    /// Iterates over every test in every file.
    pub fn tests(&self) -> impl Iterator<Item = &TestCase> + '_ {
        self.files.iter().flat_map(|file| file.tests().iter())
    }

    /// Looks up a test by its full name.
    pub fn test(&self, name: &str) -> Option<&TestCase> {
        self.files.iter().find_map(|file| file.tests().get(name))
    }

    /// Returns the parent test of a subtest, if it exists in this package.
    pub fn parent_test(&self, name: &str) -> Option<&TestCase> {
        self.subtests
            .parent(name)
            .and_then(|parent| self.test(parent))
    }

    /// Returns the subtests nested directly under `name`, in declaration order.
    pub fn subtests(&self, name: &str) -> Vec<&TestCase> {
        match self.subtests.children(name) {
            Some(children) => self
                .tests()
                .filter(|test| children.contains(test.name()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns true if `name` has a parent test in this package.
    pub fn is_subtest(&self, name: &str) -> bool {
        self.subtests.has_parent(name)
    }

    /// Returns the tests of `file_uri` that are not nested under another test.
    pub fn top_level_tests_in(&self, file_uri: &str) -> Vec<&TestCase> {
        self.files.get(file_uri).map_or_else(Vec::new, |file| {
            file.tests()
                .iter()
                .filter(|test| !self.subtests.has_parent(test.name()))
                .collect()
        })
    }

    /// Reconciles this package against a fresh consolidated record.
    ///
    /// Tests that were modified or removed lose their dynamic subtests.
    pub(crate) fn update(
        &mut self,
        group: &PackageGroup,
        root_dir_uri: &str,
        edits: &FileEdits,
    ) -> Vec<ItemEvent> {
        self.is_root_package = same_dir_uri(&self.dir_uri, root_dir_uri);
        if group.module_path.is_some() {
            self.module_path = group.module_path.clone();
        }

        let mut events = self.files.update(
            group.files(),
            TestFile::new,
            |record, file| file.update(record, edits.for_file(&record.uri)),
            |_| false,
        );

        let reloaded: Vec<SmolStr> = events
            .iter()
            .filter(|event| {
                matches!(event.kind, ItemEventKind::Modified | ItemEventKind::Removed)
                    && matches!(event.id.kind(), ItemKind::Test(_))
            })
            .filter_map(|event| event.id.name().map(SmolStr::from))
            .collect();
        for name in reloaded {
            self.remove_dynamic_descendants(&name, &mut events);
        }

        self.rebuild_subtests();
        events
    }

    /// Removes a test file, returning the events for it and its tests.
    pub(crate) fn remove_file(&mut self, uri: &str) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        if let Some(file) = self.files.remove(uri) {
            file.removed_events(&mut events);
            self.rebuild_subtests();
        }
        events
    }

    /// Finds the test called `name`, creating it and any missing intermediate levels as dynamic
    /// subtests owned by `run_id`.
    ///
    /// Returns `None` if the top-level test is unknown or if a parent already has `limit` dynamic
    /// subtests.
    pub(crate) fn make_dynamic_test_case(
        &mut self,
        name: &str,
        run_id: RunId,
        limit: usize,
        events: &mut Vec<ItemEvent>,
    ) -> Option<ItemId> {
        if let Some(test) = self.test(name) {
            return Some(test.id());
        }

        let (parent_name, _) = name.rsplit_once('/')?;
        self.make_dynamic_test_case(parent_name, run_id, limit, events)?;

        let created = self.subtests.children(parent_name).map_or(0, |children| {
            children
                .iter()
                .filter(|child| self.test(child).is_some_and(TestCase::is_dynamic))
                .count()
        });
        if created >= limit {
            debug!(
                package = %self.path,
                parent = parent_name,
                limit,
                "dynamic subtest limit reached, not creating `{name}`",
            );
            return None;
        }

        let parent = self.test(parent_name)?;
        let test = TestCase::new_dynamic(name.into(), parent, run_id);
        let id = test.id();
        let file = self.files.get_mut(test.file_uri())?;
        file.tests_mut().add(test).ok()?;

        self.rebuild_subtests();
        events.push(ItemEvent::added(id.clone()));
        Some(id)
    }

    /// Recursively removes the dynamic subtests under `name`. Static subtests are kept, but their
    /// own dynamic subtests are removed.
    pub(crate) fn remove_dynamic_test_cases(&mut self, name: &str) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        self.remove_dynamic_descendants(name, &mut events);
        self.rebuild_subtests();
        events
    }

    /// Removes every dynamic test created by `run_id`, along with anything nested under them.
    pub(crate) fn remove_run(&mut self, run_id: RunId) -> Vec<ItemEvent> {
        let owned: Vec<SmolStr> = self
            .tests()
            .filter(|test| test.run_id() == Some(run_id))
            .map(|test| SmolStr::from(test.name()))
            .collect();

        let mut events = Vec::new();
        for name in owned {
            // An earlier iteration may have removed it as a descendant.
            if self.test(&name).is_none() {
                continue;
            }
            self.remove_dynamic_descendants(&name, &mut events);
            if let Some(test) = self.remove_test(&name) {
                test.removed_events(&mut events);
            }
        }
        if !events.is_empty() {
            self.rebuild_subtests();
        }
        events
    }

    fn remove_dynamic_descendants(&mut self, name: &str, events: &mut Vec<ItemEvent>) {
        let mut children: Vec<SmolStr> = self
            .subtests
            .children(name)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default();
        children.sort_unstable();

        for child in children {
            self.remove_dynamic_descendants(&child, events);
            if self.test(&child).is_some_and(TestCase::is_dynamic) {
                if let Some(test) = self.remove_test(&child) {
                    test.removed_events(events);
                }
                self.subtests.remove_child(child.as_str());
            }
        }
    }

    fn remove_test(&mut self, name: &str) -> Option<TestCase> {
        self.files
            .iter_mut()
            .find_map(|file| file.tests_mut().remove(name))
    }

    fn rebuild_subtests(&mut self) {
        let names: HashSet<&str> = self.tests().map(TestCase::name).collect();
        let pairs: Vec<(SmolStr, SmolStr)> = names
            .iter()
            .filter_map(|name| {
                nearest_ancestor(name, &names)
                    .map(|parent| (SmolStr::from(parent), SmolStr::from(*name)))
            })
            .collect();
        self.subtests.replace(pairs);
    }
}

impl Keyed for Package {
    fn key(&self) -> &str {
        &self.path
    }
}

impl SetMember for Package {
    type Event = ItemEvent;

    fn added_events(&self, events: &mut Vec<ItemEvent>) {
        events.push(ItemEvent::added(self.id()));
    }

    fn removed_events(&self, events: &mut Vec<ItemEvent>) {
        for file in &self.files {
            file.removed_events(events);
        }
        events.push(ItemEvent::removed(self.id()));
    }
}

/// The packages owned by one root, with package-in-package nesting.
#[derive(Clone, Debug, Default)]
pub struct PackageSet {
    items: ItemSet<Package>,
    nesting: RelationMap<SmolStr>,
}

impl PackageSet {
    /// Returns the number of packages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no packages.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the packages in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Package> + '_ {
        self.items.iter()
    }

    /// Looks up a package by import path.
    pub fn get(&self, path: &str) -> Option<&Package> {
        self.items.get(path)
    }

    /// Looks up a package by the URI of its directory.
    pub fn get_by_dir(&self, dir_uri: &str) -> Option<&Package> {
        self.items
            .iter()
            .find(|package| same_dir_uri(package.dir_uri(), dir_uri))
    }

    /// Returns the package that directly contains `file_uri`.
    pub fn get_by_file(&self, file_uri: &str) -> Option<&Package> {
        self.items
            .iter()
            .find(|package| package.files().has(file_uri))
    }

    pub(crate) fn get_by_file_mut(&mut self, file_uri: &str) -> Option<&mut Package> {
        self.items
            .iter_mut()
            .find(|package| package.files().has(file_uri))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Package> + '_ {
        self.items.iter_mut()
    }

    /// Returns the nearest enclosing package of `path`.
    pub fn parent(&self, path: &str) -> Option<&Package> {
        self.nesting
            .parent(path)
            .and_then(|parent| self.items.get(parent))
    }

    /// Returns the packages nested directly under `path`, in discovery order.
    pub fn nested(&self, path: &str) -> Vec<&Package> {
        match self.nesting.children(path) {
            Some(children) => self
                .items
                .iter()
                .filter(|package| children.contains(package.path()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns `path` and every package nested under it, at any depth.
    pub fn with_nested(&self, path: &str) -> Vec<&Package> {
        let mut out = Vec::new();
        let mut stack = vec![path];
        while let Some(path) = stack.pop() {
            if let Some(package) = self.items.get(path) {
                out.push(package);
            }
            if let Some(children) = self.nesting.children(path) {
                stack.extend(children.iter().map(SmolStr::as_str));
            }
        }
        out
    }

    /// Returns true if `path` is nested under another package.
    pub fn is_nested(&self, path: &str) -> bool {
        self.nesting.has_parent(path)
    }

    /// Reconciles the packages against consolidated records.
    ///
    /// Packages absent from `groups` are removed unless `keep` returns true for them. Nesting is
    /// rebuilt once the package set has settled.
    pub(crate) fn update<'a>(
        &mut self,
        groups: impl IntoIterator<Item = &'a PackageGroup>,
        root_dir_uri: &str,
        edits: &FileEdits,
        keep: impl FnMut(&Package) -> bool,
    ) -> Vec<ItemEvent> {
        let events = self.items.update(
            groups,
            |group| Package::new(group, root_dir_uri),
            |group, package| package.update(group, root_dir_uri, edits),
            keep,
        );
        self.rebuild_nesting();
        events
    }

    /// Removes a package, returning the events for it and its contents.
    pub(crate) fn remove(&mut self, path: &str) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        if let Some(package) = self.items.remove(path) {
            package.removed_events(&mut events);
            self.rebuild_nesting();
        }
        events
    }

    /// Removes a test file from whichever package has it. A package left without files is removed
    /// too.
    pub(crate) fn remove_file(&mut self, uri: &str) -> Vec<ItemEvent> {
        let Some(package) = self.get_by_file_mut(uri) else {
            return Vec::new();
        };
        let mut events = package.remove_file(uri);
        if package.files().is_empty() {
            let path = SmolStr::from(package.path());
            events.extend(self.remove(&path));
        }
        events
    }

    /// Removes every package, returning the events.
    pub(crate) fn clear(&mut self) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        for package in &self.items {
            package.removed_events(&mut events);
        }
        *self = Self::default();
        events
    }

    pub(crate) fn removed_events(&self, events: &mut Vec<ItemEvent>) {
        for package in &self.items {
            package.removed_events(events);
        }
    }

    fn rebuild_nesting(&mut self) {
        let paths: HashSet<&str> = self.items.keys().collect();
        let pairs: Vec<(SmolStr, SmolStr)> = paths
            .iter()
            .filter_map(|path| {
                nearest_ancestor(path, &paths)
                    .map(|parent| (SmolStr::from(parent), SmolStr::from(*path)))
            })
            .collect();
        self.nesting.replace(pairs);
    }
}
