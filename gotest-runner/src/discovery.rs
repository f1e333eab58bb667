// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sources of module and package records.
//!
//! The [`Discovery`] trait is the seam between the explorer and whatever knows which tests exist.
//! Two implementations are provided:
//!
//! * [`SnapshotDiscovery`] answers from a fixed set of records, either built in memory or read
//!   from a JSON file.
//! * [`CommandDiscovery`] runs an external helper program once per query, writing the query as
//!   JSON to its standard input and reading the result from its standard output.

use crate::{
    errors::DiscoveryError,
    helpers::{parent_uri, same_dir_uri, uri_is_within},
};
use camino::Utf8Path;
use gotest_metadata::{
    CommandError, ModuleRecord, ModulesQuery, ModulesResult, PackageRecord, PackagesQuery,
    PackagesResult,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{future::Future, process::Stdio};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Answers `modules` and `packages` queries.
///
/// Implementations are treated as pure functions of their inputs at call time.
pub trait Discovery: Send + Sync {
    /// Returns the modules under `query.dir`.
    fn modules(
        &self,
        query: &ModulesQuery,
    ) -> impl Future<Output = Result<Vec<ModuleRecord>, DiscoveryError>> + Send;

    /// Returns the packages containing or under `query.files`.
    fn packages(
        &self,
        query: &PackagesQuery,
    ) -> impl Future<Output = Result<Vec<PackageRecord>, DiscoveryError>> + Send;
}

/// A fixed set of discovery records.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoverySnapshot {
    /// Every known module.
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,

    /// Every known package.
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
}

/// A [`Discovery`] that answers from a [`DiscoverySnapshot`].
#[derive(Clone, Debug, Default)]
pub struct SnapshotDiscovery {
    snapshot: DiscoverySnapshot,
}

impl SnapshotDiscovery {
    /// Creates a discovery over an in-memory snapshot.
    pub fn new(snapshot: DiscoverySnapshot) -> Self {
        Self { snapshot }
    }

    /// Reads a snapshot from a JSON file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, DiscoveryError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| DiscoveryError::SnapshotRead {
                path: path.to_owned(),
                err,
            })?;
        Self::from_json(&contents).map_err(|err| DiscoveryError::SnapshotParse {
            path: path.to_owned(),
            err,
        })
    }

    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Returns the snapshot.
    pub fn snapshot(&self) -> &DiscoverySnapshot {
        &self.snapshot
    }

    /// Replaces the snapshot, as if the sources had changed.
    pub fn set_snapshot(&mut self, snapshot: DiscoverySnapshot) {
        self.snapshot = snapshot;
    }

    fn query_modules(&self, query: &ModulesQuery) -> Vec<ModuleRecord> {
        self.snapshot
            .modules
            .iter()
            .filter(|module| {
                let dir = parent_uri(&module.go_mod);
                uri_is_within(dir, &query.dir)
                    && (query.max_depth < 0 || depth_below(dir, &query.dir) <= query.max_depth)
            })
            .cloned()
            .collect()
    }

    fn query_packages(&self, query: &PackagesQuery) -> Vec<PackageRecord> {
        self.snapshot
            .packages
            .iter()
            .filter(|package| {
                query
                    .files
                    .iter()
                    .any(|uri| package_matches(package, uri, query.recursive))
            })
            .map(|package| {
                let mut package = package.clone();
                if !query.mode.needs_tests() {
                    for file in &mut package.test_files {
                        file.tests.clear();
                    }
                }
                package
            })
            .collect()
    }
}

impl Discovery for SnapshotDiscovery {
    async fn modules(&self, query: &ModulesQuery) -> Result<Vec<ModuleRecord>, DiscoveryError> {
        Ok(self.query_modules(query))
    }

    async fn packages(&self, query: &PackagesQuery) -> Result<Vec<PackageRecord>, DiscoveryError> {
        Ok(self.query_packages(query))
    }
}

/// Returns true if `package` is selected by the file or directory `uri`.
fn package_matches(package: &PackageRecord, uri: &str, recursive: bool) -> bool {
    package.test_files.iter().any(|file| {
        let dir = parent_uri(&file.uri);
        file.uri == uri
            || same_dir_uri(dir, uri)
            || (uri.ends_with(".go") && same_dir_uri(dir, parent_uri(uri)))
            || (recursive && uri_is_within(dir, uri))
    })
}

fn depth_below(dir: &str, ancestor: &str) -> i32 {
    let rest = dir
        .strip_prefix(ancestor.trim_end_matches('/'))
        .unwrap_or_default();
    rest.split('/').filter(|segment| !segment.is_empty()).count() as i32
}

/// A [`Discovery`] that runs an external program.
///
/// The program is invoked as `<program> [args...] modules` or `<program> [args...] packages`, with
/// the query written to standard input as JSON. It must print a `modules` or `packages` result as
/// JSON to standard output and exit with code 0.
#[derive(Clone, Debug)]
pub struct CommandDiscovery {
    program: String,
    args: Vec<String>,
}

impl CommandDiscovery {
    /// Creates a new command discovery.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    async fn run<Q, R>(&self, operation: &'static str, query: &Q) -> Result<R, DiscoveryError>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let input = serde_json::to_vec(query)
            .map_err(|err| DiscoveryError::QuerySerialize { operation, err })?;
        let exec_err = |err| {
            DiscoveryError::Command(CommandError::Exec {
                program: self.program.clone(),
                err,
            })
        };

        debug!(program = %self.program, operation, "querying discovery command");
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(exec_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that exits without reading its input is judged by its exit status.
            match stdin.write_all(&input).await {
                Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(exec_err(err));
                }
                _ => {}
            }
            // Dropping stdin closes it, so the program sees the end of the query.
        }
        let output = child.wait_with_output().await.map_err(exec_err)?;
        if !output.status.success() {
            return Err(DiscoveryError::Command(CommandError::CommandFailed {
                program: self.program.clone(),
                exit_code: output.status.code(),
                stderr: output.stderr,
            }));
        }

        serde_json::from_slice(&output.stdout).map_err(|err| {
            DiscoveryError::Command(CommandError::Json {
                program: self.program.clone(),
                err,
            })
        })
    }
}

impl Discovery for CommandDiscovery {
    async fn modules(&self, query: &ModulesQuery) -> Result<Vec<ModuleRecord>, DiscoveryError> {
        let result: ModulesResult = self.run("modules", query).await?;
        Ok(result.modules)
    }

    async fn packages(&self, query: &PackagesQuery) -> Result<Vec<PackageRecord>, DiscoveryError> {
        let result: PackagesResult = self.run("packages", query).await?;
        Ok(result.packages)
    }
}
