// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reduces a selection of items to the packages and tests that actually need to run.
//!
//! A host selects arbitrary items: roots, packages, files or tests, plus items to exclude.
//! [`ResolvedRunRequest::resolve`] turns that into a minimal plan: the set of packages to run, and
//! for each package the tests that were explicitly included and excluded. A selection that is
//! already covered by a selected package is dropped, with one exception: benchmarks only run when
//! asked for, so an explicitly selected benchmark survives even if its package was selected.

use crate::{
    errors::ResolveError,
    model::{ItemId, ModelItem, Package, RootRef, TestCase, TestKind, TestModel},
};
use camino::Utf8PathBuf;
use indexmap::IndexSet;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A selection of items received from a host.
#[derive(Clone, Debug, Default)]
pub struct RunSelection {
    /// Items to run. An empty list selects every root.
    pub include: Vec<ItemId>,

    /// Items to leave out.
    pub exclude: Vec<ItemId>,
}

impl RunSelection {
    /// Creates a selection of `include`, with nothing excluded.
    pub fn new(include: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            include: include.into_iter().collect(),
            exclude: Vec::new(),
        }
    }

    /// Parses a selection from string IDs.
    pub fn parse<I, E>(include: I, exclude: E) -> Result<Self, ResolveError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let parse = |id: &str| id.parse::<ItemId>().map_err(ResolveError::from);
        Ok(Self {
            include: include
                .into_iter()
                .map(|id| parse(id.as_ref()))
                .collect::<Result<_, _>>()?,
            exclude: exclude
                .into_iter()
                .map(|id| parse(id.as_ref()))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Settings that affect how a selection is resolved.
#[derive(Copy, Clone, Debug, Default)]
pub struct RunPolicy {
    /// Selecting a package also selects the packages nested under it.
    pub nest_packages: bool,

    /// Benchmarks run whenever their package is selected.
    pub run_package_benchmarks: bool,
}

impl RunPolicy {
    /// Returns true if a selected package should run its benchmarks.
    ///
    /// A package made up only of benchmarks always does: running it selects nothing otherwise.
    pub fn should_run_benchmarks(&self, package: &Package) -> bool {
        if self.run_package_benchmarks {
            return true;
        }
        let mut tests = package.tests().peekable();
        tests.peek().is_some() && tests.all(|test| test.kind() == TestKind::Benchmark)
    }
}

/// The result of resolving a [`RunSelection`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedRunRequest {
    packages: BTreeSet<ItemId>,
    whole: BTreeSet<ItemId>,
    include: BTreeMap<ItemId, Vec<ItemId>>,
    exclude: BTreeMap<ItemId, Vec<ItemId>>,
}

impl ResolvedRunRequest {
    /// Resolves a selection against the model.
    ///
    /// Every selected item must be present in the model.
    pub fn resolve(
        model: &TestModel,
        selection: &RunSelection,
        policy: RunPolicy,
    ) -> Result<Self, ResolveError> {
        let mut whole = BTreeSet::new();
        let mut tests = IndexSet::new();

        if selection.include.is_empty() {
            for root in model.roots() {
                whole.extend(root.packages().iter().map(Package::id));
            }
        }
        for id in &selection.include {
            match find(model, id)? {
                ModelItem::Workspace(ws) => {
                    for root in ws.roots() {
                        whole.extend(root.packages().iter().map(Package::id));
                    }
                }
                ModelItem::Module(module) => {
                    whole.extend(module.packages().iter().map(Package::id));
                }
                ModelItem::Package(p) => {
                    whole.extend(selected_packages(p.root, p.package, policy));
                }
                ModelItem::File(f) => {
                    tests.extend(f.file.tests().iter().map(TestCase::id));
                }
                ModelItem::Test(t) => {
                    tests.insert(t.test.id());
                }
            }
        }

        let mut excluded_packages = BTreeSet::new();
        let mut excluded_tests = IndexSet::new();
        for id in &selection.exclude {
            match find(model, id)? {
                ModelItem::Workspace(ws) => {
                    for root in ws.roots() {
                        excluded_packages.extend(root.packages().iter().map(Package::id));
                    }
                }
                ModelItem::Module(module) => {
                    excluded_packages.extend(module.packages().iter().map(Package::id));
                }
                ModelItem::Package(p) => {
                    excluded_packages.extend(selected_packages(p.root, p.package, policy));
                }
                ModelItem::File(f) => {
                    excluded_tests.extend(f.file.tests().iter().map(TestCase::id));
                }
                ModelItem::Test(t) => {
                    excluded_tests.insert(t.test.id());
                }
            }
        }
        whole.retain(|package| !excluded_packages.contains(package));

        // Tests in an excluded package are implicitly excluded.
        let mut include: BTreeMap<ItemId, Vec<ItemId>> = BTreeMap::new();
        for test_id in tests.difference(&excluded_tests) {
            let Some(ModelItem::Test(t)) = model.find(test_id) else {
                continue;
            };
            let package_id = t.package.id();
            if excluded_packages.contains(&package_id) {
                continue;
            }
            let redundant = whole.contains(&package_id)
                && (t.test.kind() != TestKind::Benchmark
                    || policy.should_run_benchmarks(t.package));
            if !redundant {
                include.entry(package_id).or_default().push(test_id.clone());
            }
        }

        let mut packages = whole.clone();
        packages.extend(include.keys().cloned());

        let mut exclude: BTreeMap<ItemId, Vec<ItemId>> = BTreeMap::new();
        for test_id in &excluded_tests {
            let Some(ModelItem::Test(t)) = model.find(test_id) else {
                continue;
            };
            let package_id = t.package.id();
            if packages.contains(&package_id) {
                exclude.entry(package_id).or_default().push(test_id.clone());
            }
        }

        Ok(Self {
            packages,
            whole,
            include,
            exclude,
        })
    }

    /// Narrows this request to `subset`, a list of test and file items.
    ///
    /// Used to rerun only what changed. Items in `subset` that this request would not run are
    /// ignored; items missing from the model are skipped.
    pub fn narrow(&self, model: &TestModel, subset: &[ItemId], policy: RunPolicy) -> Self {
        let mut wanted = HashSet::new();
        for id in subset {
            match model.find(id) {
                Some(ModelItem::File(f)) => {
                    wanted.extend(f.file.tests().iter().map(TestCase::id));
                }
                Some(ModelItem::Test(t)) => {
                    wanted.insert(t.test.id());
                }
                _ => {}
            }
        }

        let mut candidates = Vec::new();
        let mut still_excluded = Vec::new();
        for package_id in &self.packages {
            let Some(p) = model.package(package_id) else {
                continue;
            };
            let included = self.include.get(package_id).map_or(&[][..], Vec::as_slice);
            let excluded = self.exclude.get(package_id).map_or(&[][..], Vec::as_slice);
            let whole = self.whole.contains(package_id);
            let run_benchmarks = policy.should_run_benchmarks(p.package);
            let first_candidate = candidates.len();

            for test in p.package.tests() {
                let selected = (whole && (test.kind() != TestKind::Benchmark || run_benchmarks))
                    || included.iter().any(|id| is_same_or_within(test, id));
                let skipped = excluded.iter().any(|id| is_same_or_within(test, id));
                if selected && !skipped && wanted.contains(&test.id()) {
                    candidates.push(test.id());
                }
            }

            // Exclusions still apply to whatever reruns in this package.
            if candidates.len() > first_candidate {
                still_excluded.extend(
                    excluded
                        .iter()
                        .filter(|id| model.find(id).is_some())
                        .cloned(),
                );
            }
        }

        // An empty include list would select everything.
        if candidates.is_empty() {
            return Self::default();
        }
        let selection = RunSelection {
            include: candidates,
            exclude: still_excluded,
        };
        // Every item was just found in the model, so resolution cannot fail.
        Self::resolve(model, &selection, policy).unwrap_or_default()
    }

    /// Returns the packages to run.
    pub fn packages(&self) -> &BTreeSet<ItemId> {
        &self.packages
    }

    /// Returns true if `package` was selected as a whole rather than through specific tests.
    pub fn is_whole_package(&self, package: &ItemId) -> bool {
        self.whole.contains(package)
    }

    /// Returns the explicitly included tests, per package.
    pub fn include(&self) -> &BTreeMap<ItemId, Vec<ItemId>> {
        &self.include
    }

    /// Returns the excluded tests, per package.
    pub fn exclude(&self) -> &BTreeMap<ItemId, Vec<ItemId>> {
        &self.exclude
    }

    /// Returns true if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Computes the per-package plans for this request, skipping packages no longer in the model.
    pub fn plans(&self, model: &TestModel, policy: RunPolicy) -> Vec<PackagePlan> {
        self.packages
            .iter()
            .filter_map(|package_id| {
                let p = model.package(package_id)?;
                let names = |map: &BTreeMap<ItemId, Vec<ItemId>>| -> Vec<String> {
                    map.get(package_id)
                        .into_iter()
                        .flatten()
                        .filter_map(|id| id.name().map(str::to_owned))
                        .collect()
                };
                let included = names(&self.include);
                let excluded = names(&self.exclude);
                let filters = RunFilters::new(
                    self.is_whole_package(package_id),
                    policy.should_run_benchmarks(p.package),
                    &included,
                    &excluded,
                );
                Some(PackagePlan {
                    package: package_id.clone(),
                    import_path: p.package.path().to_owned(),
                    dir: crate::helpers::uri_to_path(p.package.dir_uri())?,
                    filters,
                })
            })
            .collect()
    }
}

/// What to run for a single package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackagePlan {
    /// The package item.
    pub package: ItemId,

    /// The import path of the package.
    pub import_path: String,

    /// The package directory, where `go test` runs.
    pub dir: Utf8PathBuf,

    /// The filter flags.
    pub filters: RunFilters,
}

/// The `-run`, `-skip` and `-bench` filters passed to `go test`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunFilters {
    /// The `-run` pattern.
    pub run: Option<String>,

    /// The `-skip` pattern.
    pub skip: Option<String>,

    /// The `-bench` pattern.
    pub bench: Option<String>,
}

impl RunFilters {
    fn new(whole: bool, run_benchmarks: bool, included: &[String], excluded: &[String]) -> Self {
        let (benchmarks, tests): (Vec<&str>, Vec<&str>) = included
            .iter()
            .map(String::as_str)
            .partition(|name| TestKind::from_name(name) == Some(TestKind::Benchmark));

        let mut filters = Self {
            skip: name_pattern(excluded.iter().map(String::as_str)),
            ..Self::default()
        };
        if whole {
            // `go test` runs every test by default, so only benchmarks need asking for.
            filters.bench = if run_benchmarks {
                Some(".".to_owned())
            } else {
                name_pattern(benchmarks)
            };
        } else {
            filters.bench = name_pattern(benchmarks);
            filters.run = match name_pattern(tests) {
                Some(pattern) => Some(pattern),
                None if filters.bench.is_some() => Some("^$".to_owned()),
                None => None,
            };
        }
        filters
    }

    /// Returns the filters as `go test` arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, pattern) in [("-run", &self.run), ("-bench", &self.bench), ("-skip", &self.skip)] {
            if let Some(pattern) = pattern {
                args.push(flag.to_owned());
                args.push(pattern.clone());
            }
        }
        args
    }
}

/// Builds a pattern matching exactly the named tests.
///
/// `go test` splits patterns on unbracketed slashes and matches each level separately, so every
/// name becomes a sequence of anchored levels. A name whose ancestor is also listed is dropped:
/// the ancestor already runs it.
fn name_pattern<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let names: IndexSet<&str> = names.into_iter().collect();
    let pattern = names
        .iter()
        .filter(|name| !has_listed_ancestor(name, &names))
        .map(|name| {
            name.split('/')
                .map(|segment| format!("^{}$", regex::escape(segment)))
                .join("/")
        })
        .join("|");
    (!pattern.is_empty()).then_some(pattern)
}

fn has_listed_ancestor(name: &str, names: &IndexSet<&str>) -> bool {
    name.match_indices('/')
        .any(|(idx, _)| names.contains(&name[..idx]))
}

fn find<'a>(model: &'a TestModel, id: &ItemId) -> Result<ModelItem<'a>, ResolveError> {
    model
        .find(id)
        .ok_or_else(|| ResolveError::NotFound { id: id.clone() })
}

/// The packages selected by selecting `package`.
fn selected_packages(root: RootRef<'_>, package: &Package, policy: RunPolicy) -> Vec<ItemId> {
    if policy.nest_packages {
        root.packages()
            .with_nested(package.path())
            .into_iter()
            .map(Package::id)
            .collect()
    } else {
        vec![package.id()]
    }
}

/// Returns true if `test` is the test `id`, or one of its subtests.
fn is_same_or_within(test: &TestCase, id: &ItemId) -> bool {
    let Some(name) = id.name() else {
        return false;
    };
    test.file_uri() == id.uri()
        && (test.name() == name
            || test
                .name()
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('/')))
}
