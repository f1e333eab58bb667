// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keeps the model in sync with the discovery service.
//!
//! The [`Explorer`] owns the [`TestModel`] and is the only thing that mutates it. Discovery is
//! queried in response to explicit refreshes and to file lifecycle notifications from a host
//! (`did_open`, `did_save`, `did_delete`). Every query completes before anything is applied, so a
//! failed query leaves the model as it was.
//!
//! Changes are published on a broadcast channel as [`ExplorerEvent`]s.

use crate::{
    config::{ExplorerConfig, ViewSettings},
    discovery::Discovery,
    errors::{DiscoveryError, DisplayErrorChain, RunTestsError},
    helpers::uri_is_within,
    model::{FileEdits, ItemEvent, ItemEventKind, ItemId, RunId, TestModel, UpdateScope},
    presenter::ItemResolver,
    run_request::{ResolvedRunRequest, RunPolicy},
    runner::{RunEvent, RunReport, TestRunner},
};
use camino::Utf8Path;
use futures::future::join_all;
use gotest_metadata::{ModulesQuery, PackagesMode, PackagesQuery, Range};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// The capacity of the notification channel. Slow receivers miss older notifications.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A notification published by the [`Explorer`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExplorerEvent {
    /// Items were added, removed, modified or moved.
    ItemsChanged(Vec<ItemEvent>),

    /// Results recorded for these items no longer apply.
    ResultsInvalidated(Vec<ItemId>),
}

/// Reconciles the model against a [`Discovery`] service.
#[derive(Debug)]
pub struct Explorer<D> {
    discovery: D,
    model: TestModel,
    view: ViewSettings,
    policy: RunPolicy,
    module_max_depth: i32,
    strict: bool,
    sender: broadcast::Sender<ExplorerEvent>,
}

impl<D: Discovery> Explorer<D> {
    /// Creates an explorer with an empty model.
    pub fn new(discovery: D, config: &ExplorerConfig) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            discovery,
            model: TestModel::new(config.model_options()),
            view: *config.view(),
            policy: RunPolicy {
                nest_packages: config.view().nest_packages,
                run_package_benchmarks: config.run_package_benchmarks(),
            },
            module_max_depth: i32::try_from(config.module_max_depth()).unwrap_or(i32::MAX),
            strict: config.strict(),
            sender,
        }
    }

    /// Subscribes to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.sender.subscribe()
    }

    /// Returns the model.
    pub fn model(&self) -> &TestModel {
        &self.model
    }

    /// Returns the discovery service.
    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Returns the discovery service, mutably.
    pub fn discovery_mut(&mut self) -> &mut D {
        &mut self.discovery
    }

    /// Returns a resolver for the presented tree.
    pub fn resolver(&self) -> ItemResolver<'_> {
        ItemResolver::new(&self.model, self.view)
    }

    /// Returns the policy used to resolve run requests.
    pub fn run_policy(&self) -> RunPolicy {
        self.policy
    }

    /// Adds a workspace rooted at `dir` and discovers its contents.
    pub async fn add_workspace(&mut self, dir: &Utf8Path) -> Result<ItemId, DiscoveryError> {
        let id = self.model.add_workspace(dir)?;
        self.publish(vec![ItemEvent::added(id.clone())]);
        self.refresh_root(&id).await?;
        Ok(id)
    }

    /// Removes a workspace and everything under it.
    pub fn remove_workspace(&mut self, id: &ItemId) {
        let events = self.model.remove_workspace(id);
        self.publish(events);
    }

    /// Rediscovers every workspace.
    ///
    /// Workspaces are queried concurrently and applied in order once all queries have finished.
    pub async fn refresh_all(&mut self) -> Result<(), DiscoveryError> {
        let roots: Vec<(ItemId, String)> = self
            .model
            .workspaces()
            .iter()
            .map(|ws| (ws.id(), ws.dir_uri().to_owned()))
            .collect();
        let results = join_all(
            roots
                .iter()
                .map(|(_, dir_uri)| query_root(&self.discovery, dir_uri, self.module_max_depth)),
        )
        .await;

        let mut snapshots = Vec::new();
        for ((id, _), result) in roots.into_iter().zip(results) {
            match result {
                Ok(snapshot) => snapshots.push((id, snapshot)),
                Err(err) => {
                    if self.strict {
                        return Err(err);
                    }
                    error!(workspace = %id, "{}", DisplayErrorChain::new(&err));
                }
            }
        }
        for (id, (modules, packages)) in snapshots {
            self.apply_root(&id, &modules, &packages);
        }
        Ok(())
    }

    /// Rediscovers a single workspace.
    pub async fn refresh_root(&mut self, workspace: &ItemId) -> Result<(), DiscoveryError> {
        let Some(dir_uri) = self
            .model
            .workspaces()
            .get(workspace.uri())
            .map(|ws| ws.dir_uri().to_owned())
        else {
            debug!(%workspace, "refresh of unknown workspace ignored");
            return Ok(());
        };

        match query_root(&self.discovery, &dir_uri, self.module_max_depth).await {
            Ok((modules, packages)) => {
                self.apply_root(workspace, &modules, &packages);
                Ok(())
            }
            Err(err) => self.discovery_failed(err),
        }
    }

    /// Handles a test file being opened in an editor.
    pub async fn did_open(&mut self, file_uri: &str) -> Result<(), DiscoveryError> {
        self.update_file(file_uri, &[]).await.map(|_| ())
    }

    /// Handles a test file being saved, with the ranges that were edited since the last save.
    ///
    /// Returns the items whose results were invalidated: the file itself and any tests whose
    /// contents changed.
    pub async fn did_save(
        &mut self,
        file_uri: &str,
        edits: &[Range],
    ) -> Result<Vec<ItemId>, DiscoveryError> {
        self.update_file(file_uri, edits).await
    }

    /// Handles a test file being deleted.
    pub fn did_delete(&mut self, file_uri: &str) {
        let events = self.model.remove_file(file_uri);
        self.publish(events);
    }

    /// Removes the dynamic subtests created by a run, along with its results.
    pub fn invalidate_run(&mut self, run_id: RunId) {
        let events = self.model.invalidate_run(run_id);
        let ids: Vec<ItemId> = events.iter().map(|event| event.id.clone()).collect();
        self.publish(events);
        if !ids.is_empty() {
            self.send(ExplorerEvent::ResultsInvalidated(ids));
        }
    }

    /// Runs a resolved request, publishing any subtests it creates.
    pub async fn run_tests<F>(
        &mut self,
        runner: &TestRunner,
        request: &ResolvedRunRequest,
        cancel: &CancellationToken,
        mut callback: F,
    ) -> Result<RunReport, RunTestsError>
    where
        F: FnMut(RunEvent),
    {
        let sender = self.sender.clone();
        runner
            .execute(&mut self.model, request, cancel, |event| {
                if let RunEvent::ItemsChanged { events } = &event {
                    _ = sender.send(ExplorerEvent::ItemsChanged(events.clone()));
                }
                callback(event);
            })
            .await
    }

    async fn update_file(
        &mut self,
        file_uri: &str,
        edits: &[Range],
    ) -> Result<Vec<ItemId>, DiscoveryError> {
        if !file_uri.ends_with("_test.go") {
            return Ok(Vec::new());
        }
        let Some(workspace) = self
            .model
            .workspaces()
            .iter()
            .find(|ws| uri_is_within(file_uri, ws.dir_uri()))
            .map(|ws| ws.id())
        else {
            debug!(file_uri, "file is outside every workspace");
            return Ok(Vec::new());
        };

        let query = PackagesQuery {
            files: vec![file_uri.to_owned()],
            recursive: false,
            mode: PackagesMode::NEED_TESTS,
        };
        let records = match self.discovery.packages(&query).await {
            Ok(records) => records,
            Err(err) => return self.discovery_failed(err).map(|()| Vec::new()),
        };

        let mut file_edits = FileEdits::new();
        file_edits.add(file_uri, edits.iter().copied());
        let events = self.model.update_packages(
            &workspace,
            &records,
            UpdateScope::Reported,
            &file_edits,
        );

        let mut invalidated = vec![ItemId::file(file_uri)];
        invalidated.extend(
            events
                .iter()
                .filter(|event| event.kind == ItemEventKind::Modified)
                .map(|event| event.id.clone()),
        );
        self.publish(events);
        self.send(ExplorerEvent::ResultsInvalidated(invalidated.clone()));
        Ok(invalidated)
    }

    fn apply_root(
        &mut self,
        workspace: &ItemId,
        modules: &[gotest_metadata::ModuleRecord],
        packages: &[gotest_metadata::PackageRecord],
    ) {
        let mut events = self.model.update_modules(workspace, modules);
        events.extend(self.model.update_packages(
            workspace,
            packages,
            UpdateScope::Full,
            &FileEdits::new(),
        ));
        self.publish(events);
    }

    fn discovery_failed(&self, err: DiscoveryError) -> Result<(), DiscoveryError> {
        if self.strict {
            Err(err)
        } else {
            error!("{}", DisplayErrorChain::new(&err));
            Ok(())
        }
    }

    fn publish(&self, events: Vec<ItemEvent>) {
        if !events.is_empty() {
            self.send(ExplorerEvent::ItemsChanged(events));
        }
    }

    fn send(&self, event: ExplorerEvent) {
        // An error only means nobody is listening.
        _ = self.sender.send(event);
    }
}

type RootSnapshot = (
    Vec<gotest_metadata::ModuleRecord>,
    Vec<gotest_metadata::PackageRecord>,
);

async fn query_root<D: Discovery>(
    discovery: &D,
    dir_uri: &str,
    max_depth: i32,
) -> Result<RootSnapshot, DiscoveryError> {
    let modules = discovery
        .modules(&ModulesQuery {
            dir: dir_uri.to_owned(),
            max_depth,
        })
        .await?;
    let packages = discovery
        .packages(&PackagesQuery {
            files: vec![dir_uri.to_owned()],
            recursive: true,
            mode: PackagesMode::NEED_TESTS,
        })
        .await?;
    Ok((modules, packages))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::discovery::{DiscoverySnapshot, SnapshotDiscovery};
    use gotest_metadata::{Location, PackageRecord, Position, TestCaseRecord, TestFileRecord};
    use pretty_assertions::assert_eq;

    struct FailingDiscovery;

    impl Discovery for FailingDiscovery {
        async fn modules(
            &self,
            _query: &ModulesQuery,
        ) -> Result<Vec<gotest_metadata::ModuleRecord>, DiscoveryError> {
            Err(DiscoveryError::InvalidWorkspaceDir {
                dir: "broken".into(),
            })
        }

        async fn packages(&self, _query: &PackagesQuery) -> Result<Vec<PackageRecord>, DiscoveryError> {
            Ok(Vec::new())
        }
    }

    fn package(tests: &[(&str, u32, u32)]) -> PackageRecord {
        let uri = "file:///src/x_test.go".to_owned();
        PackageRecord {
            path: "x".to_owned(),
            for_test: None,
            module_path: None,
            test_files: vec![TestFileRecord {
                uri: uri.clone(),
                tests: tests
                    .iter()
                    .map(|(name, start, end)| TestCaseRecord {
                        name: (*name).into(),
                        loc: Location {
                            uri: uri.clone(),
                            range: Range::lines(*start, *end),
                        },
                    })
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn discovery_errors_are_logged_unless_strict() {
        let mut config = ExplorerConfig::default();
        let mut explorer = Explorer::new(FailingDiscovery, &config);
        explorer
            .add_workspace(Utf8Path::new("/src"))
            .await
            .expect("non-strict mode swallows discovery errors");
        assert_eq!(explorer.model().workspaces().len(), 1);

        config.set_strict(true);
        let mut explorer = Explorer::new(FailingDiscovery, &config);
        let err = explorer
            .add_workspace(Utf8Path::new("/src"))
            .await
            .expect_err("strict mode surfaces discovery errors");
        assert!(matches!(err, DiscoveryError::InvalidWorkspaceDir { .. }));
    }

    #[tokio::test]
    async fn save_invalidates_modified_tests() {
        let discovery = SnapshotDiscovery::new(DiscoverySnapshot {
            modules: vec![],
            packages: vec![package(&[("TestA", 2, 6), ("TestB", 8, 12)])],
        });
        let mut explorer = Explorer::new(discovery, &ExplorerConfig::default());
        explorer
            .add_workspace(Utf8Path::new("/src"))
            .await
            .expect("discovery succeeds");
        let mut rx = explorer.subscribe();

        // TestA grows by a line, which pushes TestB down.
        explorer.discovery_mut().set_snapshot(DiscoverySnapshot {
            modules: vec![],
            packages: vec![package(&[("TestA", 2, 7), ("TestB", 9, 13)])],
        });
        let edit = Range::new(Position::new(4, 0), Position::new(4, 5));
        let invalidated = explorer
            .did_save("file:///src/x_test.go", &[edit])
            .await
            .expect("discovery succeeds");

        let test_a = ItemId::test("file:///src/x_test.go", crate::model::TestKind::Test, "TestA");
        let test_b = ItemId::test("file:///src/x_test.go", crate::model::TestKind::Test, "TestB");
        assert_eq!(
            invalidated,
            vec![ItemId::file("file:///src/x_test.go"), test_a.clone()]
        );
        assert_eq!(
            rx.recv().await.expect("items changed"),
            ExplorerEvent::ItemsChanged(vec![ItemEvent::modified(test_a), ItemEvent::moved(test_b)])
        );
        assert!(matches!(
            rx.recv().await.expect("results invalidated"),
            ExplorerEvent::ResultsInvalidated(_)
        ));
    }

    #[tokio::test]
    async fn non_test_files_are_ignored() {
        let mut explorer = Explorer::new(SnapshotDiscovery::default(), &ExplorerConfig::default());
        explorer
            .add_workspace(Utf8Path::new("/src"))
            .await
            .expect("discovery succeeds");
        let invalidated = explorer
            .did_save("file:///src/main.go", &[])
            .await
            .expect("nothing to do");
        assert_eq!(invalidated, vec![]);
    }
}
