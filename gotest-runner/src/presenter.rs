// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps the model onto the tree shown by a host.
//!
//! [`ItemResolver`] is a pure function of the model and the current [`ViewSettings`]: it computes
//! the children, parent and label of any item. It never mutates the model, and an ID that no longer
//! resolves to a model item simply has no children, no parent and no label.

use crate::{
    config::{DiscoveryMode, ViewSettings},
    errors::ResolveError,
    helpers::uri_base_name,
    model::{ItemId, ItemKind, ModelItem, Package, RootRef, TestCase, TestModel},
};
use gotest_metadata::Range;
use serde::Serialize;

/// Computes the presented tree for a model.
#[derive(Copy, Clone, Debug)]
pub struct ItemResolver<'a> {
    model: &'a TestModel,
    settings: ViewSettings,
}

impl<'a> ItemResolver<'a> {
    /// Creates a resolver over `model`.
    pub fn new(model: &'a TestModel, settings: ViewSettings) -> Self {
        Self { model, settings }
    }

    /// Parses an ID received from the host.
    ///
    /// An ID that fails to parse is a protocol error, unlike an ID that parses but refers to
    /// something no longer in the model.
    pub fn parse_id(&self, id: &str) -> Result<ItemId, ResolveError> {
        Ok(id.parse()?)
    }

    /// Returns the children of `parent`, or the top-level items if `parent` is `None`.
    pub fn children(&self, parent: Option<&ItemId>) -> Vec<ItemId> {
        let Some(parent) = parent else {
            return self.top_level();
        };
        if self.settings.discovery == DiscoveryMode::Off {
            return Vec::new();
        }

        match self.model.find(parent) {
            None => Vec::new(),
            Some(ModelItem::Workspace(ws)) => self.root_children(RootRef::Workspace(ws)),
            Some(ModelItem::Module(module)) => self.root_children(RootRef::Module(module)),
            Some(ModelItem::Package(p)) => self.package_children(p.root, p.package),
            Some(ModelItem::File(f)) => self.tests_in(f.package, Some(f.file.uri())),
            Some(ModelItem::Test(t)) => {
                if self.settings.nest_subtests {
                    t.package
                        .subtests(t.test.name())
                        .into_iter()
                        .map(TestCase::id)
                        .collect()
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Returns the presented parent of `item`, or `None` for top-level items and items not in the
    /// model.
    pub fn parent(&self, item: &ItemId) -> Option<ItemId> {
        match self.model.find(item)? {
            ModelItem::Workspace(_) | ModelItem::Module(_) => None,
            ModelItem::Package(p) => {
                let parent = if self.settings.nest_packages {
                    p.root.packages().parent(p.package.path())
                } else {
                    None
                };
                Some(match parent {
                    Some(parent) => package_node(p.root, parent),
                    None => p.root.id(),
                })
            }
            ModelItem::File(f) => Some(package_node(f.root, f.package)),
            ModelItem::Test(t) => {
                if self.settings.nest_subtests {
                    if let Some(parent) = t.package.parent_test(t.test.name()) {
                        return Some(parent.id());
                    }
                }
                if self.settings.show_files {
                    Some(crate::model::ItemId::file(t.test.file_uri()))
                } else {
                    Some(package_node(t.root, t.package))
                }
            }
        }
    }

    /// Returns the display label for `item`.
    pub fn label(&self, item: &ItemId) -> Option<String> {
        let label = match self.model.find(item)? {
            ModelItem::Workspace(ws) => RootRef::Workspace(ws).label(),
            ModelItem::Module(module) => RootRef::Module(module).label(),
            ModelItem::Package(p) => {
                let parent = if self.settings.nest_packages {
                    p.root.packages().parent(p.package.path())
                } else {
                    None
                };
                package_label(p.root, p.package, parent)
            }
            ModelItem::File(f) => uri_base_name(f.file.uri()),
            ModelItem::Test(t) => {
                let parent = if self.settings.nest_subtests {
                    t.package.parent_test(t.test.name())
                } else {
                    None
                };
                match parent {
                    Some(parent) => t
                        .test
                        .name()
                        .strip_prefix(parent.name())
                        .and_then(|rest| rest.strip_prefix('/'))
                        .unwrap_or(t.test.name())
                        .to_owned(),
                    None => t.test.name().to_owned(),
                }
            }
        };
        Some(label)
    }

    /// Describes a single item, without its children.
    pub fn describe(&self, item: &ItemId) -> Option<PresentedItem> {
        let label = self.label(item)?;
        let range = match self.model.find(item)? {
            ModelItem::Test(t) => t.test.range(),
            _ => None,
        };
        Some(PresentedItem {
            id: item.to_string(),
            kind: item.kind().to_string(),
            label,
            range,
            dynamic: matches!(self.model.find(item), Some(ModelItem::Test(t)) if t.test.is_dynamic()),
            children: Vec::new(),
        })
    }

    /// Resolves the whole presented tree.
    pub fn tree(&self) -> Vec<PresentedItem> {
        self.children(None)
            .iter()
            .filter_map(|id| self.subtree(id))
            .collect()
    }

    fn subtree(&self, id: &ItemId) -> Option<PresentedItem> {
        let mut item = self.describe(id)?;
        item.children = self
            .children(Some(id))
            .iter()
            .filter_map(|child| self.subtree(child))
            .collect();
        Some(item)
    }

    fn top_level(&self) -> Vec<ItemId> {
        let mut out = Vec::new();
        for ws in self.model.workspaces() {
            if !ws.packages().is_empty() || ws.modules().is_empty() {
                out.push(ws.id());
            }
            out.extend(ws.modules().iter().map(|module| module.id()));
        }
        out
    }

    fn root_children(&self, root: RootRef<'a>) -> Vec<ItemId> {
        let packages = root.packages();
        let mut visible: Vec<&Package> = packages
            .iter()
            .filter(|package| !self.settings.nest_packages || !packages.is_nested(package.path()))
            .collect();
        visible.sort_by(|a, b| a.path().cmp(b.path()));

        let mut out = Vec::new();
        let mut spliced = Vec::new();
        for package in visible {
            if package.is_root_package() {
                spliced.extend(self.package_children(root, package));
            } else {
                out.push(package.id());
            }
        }
        out.extend(spliced);
        out
    }

    fn package_children(&self, root: RootRef<'a>, package: &Package) -> Vec<ItemId> {
        let mut out = Vec::new();
        if self.settings.nest_packages {
            let mut nested = root.packages().nested(package.path());
            nested.sort_by(|a, b| a.path().cmp(b.path()));
            out.extend(nested.into_iter().map(Package::id));
        }
        if self.settings.show_files {
            out.extend(package.files().iter().map(|file| file.id()));
        } else {
            out.extend(self.tests_in(package, None));
        }
        out
    }

    /// Tests shown directly under a package (`file_uri` is `None`) or a file.
    fn tests_in(&self, package: &Package, file_uri: Option<&str>) -> Vec<ItemId> {
        package
            .files()
            .iter()
            .filter(|file| file_uri.is_none_or(|uri| file.uri() == uri))
            .flat_map(|file| file.tests().iter())
            .filter(|test| !self.settings.nest_subtests || !package.is_subtest(test.name()))
            .map(TestCase::id)
            .collect()
    }
}

/// The node that stands for `package`: the root itself if the package was collapsed into it.
fn package_node(root: RootRef<'_>, package: &Package) -> ItemId {
    if package.is_root_package() {
        root.id()
    } else {
        package.id()
    }
}

fn package_label(root: RootRef<'_>, package: &Package, parent: Option<&Package>) -> String {
    let path = package.path();
    let prefix = match (parent, root) {
        (Some(parent), _) => Some(parent.path()),
        (None, RootRef::Module(module)) => Some(module.path()),
        (None, RootRef::Workspace(_)) => None,
    };
    prefix
        .and_then(|prefix| path.strip_prefix(prefix))
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
        .to_owned()
}

/// A presented item, as serialized for hosts and `list --message-format json`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PresentedItem {
    /// The item ID.
    pub id: String,

    /// The kind of item.
    pub kind: String,

    /// The display label.
    pub label: String,

    /// The declared range, for static tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,

    /// True for tests created during a run.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dynamic: bool,

    /// The presented children.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PresentedItem>,
}

impl PresentedItem {
    /// Returns true if this item is a root or package, as opposed to a file or test.
    pub fn is_container(&self) -> bool {
        self.id
            .parse::<ItemId>()
            .is_ok_and(|id| matches!(id.kind(), ItemKind::Workspace | ItemKind::Module | ItemKind::Package))
    }
}
