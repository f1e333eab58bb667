// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{FileEdits, InstanceId, ItemEvent, ItemId, Package, PackageGroup, PackageSet};
use crate::{
    helpers::{parent_uri, uri_base_name},
    item_set::{ItemSet, Keyed, SetMember},
};
use camino::{Utf8Path, Utf8PathBuf};
use gotest_metadata::ModuleRecord;
use smol_str::SmolStr;

/// A configured workspace folder.
///
/// Owns the modules found under it, and the packages that don't belong to any of those modules.
#[derive(Clone, Debug)]
pub struct Workspace {
    instance: InstanceId,
    dir: Utf8PathBuf,
    dir_uri: SmolStr,
    pub(super) modules: ItemSet<Module>,
    pub(super) packages: PackageSet,
}

impl Workspace {
    pub(crate) fn new(dir: Utf8PathBuf, dir_uri: String) -> Self {
        Self {
            instance: InstanceId::next(),
            dir,
            dir_uri: dir_uri.trim_end_matches('/').into(),
            modules: ItemSet::new(),
            packages: PackageSet::default(),
        }
    }

    /// Returns the stable ID of this workspace.
    pub fn id(&self) -> ItemId {
        ItemId::workspace(self.dir_uri.clone())
    }

    /// Returns the identity of this particular object.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns the workspace directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the URI of the workspace directory.
    pub fn dir_uri(&self) -> &str {
        &self.dir_uri
    }

    /// Returns the display name: the directory's base name.
    pub fn name(&self) -> &str {
        self.dir.file_name().unwrap_or(self.dir.as_str())
    }

    /// Returns the modules in this workspace.
    pub fn modules(&self) -> &ItemSet<Module> {
        &self.modules
    }

    /// Returns the packages that are not inside a module.
    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }

    pub(super) fn update_packages<'a>(
        &mut self,
        groups: impl IntoIterator<Item = &'a PackageGroup>,
        edits: &FileEdits,
        keep: impl FnMut(&Package) -> bool,
    ) -> Vec<ItemEvent> {
        self.packages.update(groups, &self.dir_uri, edits, keep)
    }

    /// Iterates over this workspace and its modules as roots.
    pub fn roots(&self) -> impl Iterator<Item = RootRef<'_>> + '_ {
        std::iter::once(RootRef::Workspace(self)).chain(self.modules.iter().map(RootRef::Module))
    }
}

impl Keyed for Workspace {
    fn key(&self) -> &str {
        &self.dir_uri
    }
}

impl SetMember for Workspace {
    type Event = ItemEvent;

    fn added_events(&self, events: &mut Vec<ItemEvent>) {
        events.push(ItemEvent::added(self.id()));
    }

    fn removed_events(&self, events: &mut Vec<ItemEvent>) {
        for module in &self.modules {
            module.removed_events(events);
        }
        self.packages.removed_events(events);
        events.push(ItemEvent::removed(self.id()));
    }
}

/// A Go module, identified by its `go.mod` file.
#[derive(Clone, Debug)]
pub struct Module {
    instance: InstanceId,
    path: SmolStr,
    go_mod_uri: SmolStr,
    dir_uri: SmolStr,
    pub(super) packages: PackageSet,
}

impl Module {
    pub(crate) fn new(record: &ModuleRecord) -> Self {
        Self {
            instance: InstanceId::next(),
            path: record.path.as_str().into(),
            go_mod_uri: record.go_mod.as_str().into(),
            dir_uri: parent_uri(&record.go_mod).into(),
            packages: PackageSet::default(),
        }
    }

    /// Returns the stable ID of this module.
    pub fn id(&self) -> ItemId {
        ItemId::module(self.go_mod_uri.clone())
    }

    /// Returns the identity of this particular object.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns the module path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the URI of the `go.mod` file.
    pub fn go_mod_uri(&self) -> &str {
        &self.go_mod_uri
    }

    /// Returns the URI of the module directory.
    pub fn dir_uri(&self) -> &str {
        &self.dir_uri
    }

    /// Returns the packages in this module.
    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }

    pub(super) fn update_packages<'a>(
        &mut self,
        groups: impl IntoIterator<Item = &'a PackageGroup>,
        edits: &FileEdits,
        keep: impl FnMut(&Package) -> bool,
    ) -> Vec<ItemEvent> {
        self.packages.update(groups, &self.dir_uri, edits, keep)
    }

    /// Updates the module from a fresh record.
    ///
    /// A module whose `go.mod` moved has a new identity: it is reported as removed and re-added,
    /// and its packages are dropped until the next package refresh.
    pub(crate) fn update(&mut self, record: &ModuleRecord) -> Vec<ItemEvent> {
        if self.go_mod_uri == record.go_mod {
            return Vec::new();
        }

        let mut events = self.packages.clear();
        events.push(ItemEvent::removed(self.id()));
        self.go_mod_uri = record.go_mod.as_str().into();
        self.dir_uri = parent_uri(&record.go_mod).into();
        events.push(ItemEvent::added(self.id()));
        events
    }
}

impl Keyed for Module {
    fn key(&self) -> &str {
        &self.path
    }
}

impl Keyed for ModuleRecord {
    fn key(&self) -> &str {
        &self.path
    }
}

impl SetMember for Module {
    type Event = ItemEvent;

    fn added_events(&self, events: &mut Vec<ItemEvent>) {
        events.push(ItemEvent::added(self.id()));
    }

    fn removed_events(&self, events: &mut Vec<ItemEvent>) {
        self.packages.removed_events(events);
        events.push(ItemEvent::removed(self.id()));
    }
}

/// A borrowed root: a workspace or a module.
#[derive(Copy, Clone, Debug)]
pub enum RootRef<'a> {
    /// A workspace.
    Workspace(&'a Workspace),

    /// A module.
    Module(&'a Module),
}

impl<'a> RootRef<'a> {
    /// Returns the stable ID of the root.
    pub fn id(self) -> ItemId {
        match self {
            Self::Workspace(ws) => ws.id(),
            Self::Module(module) => module.id(),
        }
    }

    /// Returns the URI of the root directory.
    pub fn dir_uri(self) -> &'a str {
        match self {
            Self::Workspace(ws) => ws.dir_uri(),
            Self::Module(module) => module.dir_uri(),
        }
    }

    /// Returns the packages owned directly by this root.
    pub fn packages(self) -> &'a PackageSet {
        match self {
            Self::Workspace(ws) => ws.packages(),
            Self::Module(module) => module.packages(),
        }
    }

    /// Returns the display label.
    pub fn label(self) -> String {
        match self {
            Self::Workspace(ws) => ws.name().to_owned(),
            Self::Module(module) => {
                if module.path().is_empty() {
                    uri_base_name(module.dir_uri())
                } else {
                    module.path().to_owned()
                }
            }
        }
    }
}
