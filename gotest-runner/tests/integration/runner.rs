// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a stand-in `go` binary that replays canned `go test -json` output.

use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{OptionExt, Result, WrapErr};
use gotest_runner::{
    config::{ExplorerConfig, TestThreads},
    discovery::{DiscoverySnapshot, SnapshotDiscovery},
    explorer::{Explorer, ExplorerEvent},
    model::{ItemId, ModelItem, TestKind},
    path_to_uri,
    run_request::{ResolvedRunRequest, RunSelection},
    runner::{RunEvent, TestRunner},
};
use gotest_metadata::{Location, PackageRecord, Range, TestCaseRecord, TestFileRecord};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::os::unix::fs::PermissionsExt;
use tokio_util::sync::CancellationToken;

const FAKE_GO: &str = indoc! {r#"
    #!/bin/sh
    cat <<'JSON'
    {"Action":"start","Package":"example.com/foo"}
    {"Action":"run","Package":"example.com/foo","Test":"TestA"}
    {"Action":"output","Package":"example.com/foo","Test":"TestA","Output":"=== RUN   TestA\n"}
    {"Action":"pass","Package":"example.com/foo","Test":"TestA","Elapsed":0.01}
    {"Action":"run","Package":"example.com/foo","Test":"TestB"}
    {"Action":"run","Package":"example.com/foo","Test":"TestB/case_1"}
    {"Action":"output","Package":"example.com/foo","Test":"TestB/case_1","Output":"    foo_test.go:12: boom\n"}
    {"Action":"fail","Package":"example.com/foo","Test":"TestB/case_1","Elapsed":0}
    {"Action":"fail","Package":"example.com/foo","Test":"TestB","Elapsed":0}
    {"Action":"fail","Package":"example.com/foo","Elapsed":0.02}
    JSON
    exit 1
"#};

struct Fixture {
    _dir: Utf8TempDir,
    explorer: Explorer<SnapshotDiscovery>,
    runner: TestRunner,
    file_uri: String,
}

async fn fixture() -> Result<Fixture> {
    let dir = camino_tempfile::tempdir().wrap_err("failed to create temp dir")?;
    let go = dir.path().join("fake-go");
    std::fs::write(&go, FAKE_GO)?;
    std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755))?;

    let dir_uri = path_to_uri(dir.path()).ok_or_eyre("temp dir is not absolute")?;
    let file_uri = format!("{dir_uri}/foo_test.go");
    let tests = [("TestA", 2, 6), ("TestB", 8, 16)]
        .into_iter()
        .map(|(name, start, end)| TestCaseRecord {
            name: name.into(),
            loc: Location {
                uri: file_uri.clone(),
                range: Range::lines(start, end),
            },
        })
        .collect();
    let snapshot = DiscoverySnapshot {
        modules: vec![],
        packages: vec![PackageRecord {
            path: "example.com/foo".to_owned(),
            for_test: None,
            module_path: None,
            test_files: vec![TestFileRecord {
                uri: file_uri.clone(),
                tests,
            }],
        }],
    };

    let mut config = ExplorerConfig::default();
    config.set_go_binary(go.as_str());
    config.set_test_threads(TestThreads::Count(1));

    let mut explorer = Explorer::new(SnapshotDiscovery::new(snapshot), &config);
    explorer.add_workspace(dir.path()).await?;
    let runner = TestRunner::new(config.runner().clone(), explorer.run_policy());
    Ok(Fixture {
        _dir: dir,
        explorer,
        runner,
        file_uri,
    })
}

fn is_dynamic(explorer: &Explorer<SnapshotDiscovery>, id: &ItemId) -> bool {
    matches!(explorer.model().find(id), Some(ModelItem::Test(t)) if t.test.is_dynamic())
}

#[tokio::test]
async fn run_streams_results_and_creates_subtests() -> Result<()> {
    let Fixture {
        _dir,
        mut explorer,
        runner,
        file_uri,
    } = fixture().await?;

    let request = ResolvedRunRequest::resolve(
        explorer.model(),
        &RunSelection::default(),
        explorer.run_policy(),
    )?;
    let mut rx = explorer.subscribe();
    let mut events = Vec::new();
    let report = explorer
        .run_tests(&runner, &request, &CancellationToken::new(), |event| {
            events.push(event)
        })
        .await?;

    let test_a = ItemId::test(file_uri.clone(), TestKind::Test, "TestA");
    let test_b = ItemId::test(file_uri.clone(), TestKind::Test, "TestB");
    let case_1 = ItemId::test(file_uri.clone(), TestKind::Test, "TestB/case_1");

    assert!(events.iter().any(|event| matches!(
        event,
        RunEvent::Passed { id, elapsed_ms: Some(_) } if *id == test_a
    )));
    let failure = events.iter().find_map(|event| match event {
        RunEvent::Failed { id, messages, .. } if *id == case_1 => Some(messages.clone()),
        _ => None,
    });
    let messages = failure.expect("case_1 failed");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "boom");
    assert_eq!(
        messages[0].location.as_ref().map(|l| (l.uri.as_str(), l.range.start.line)),
        Some((file_uri.as_str(), 11))
    );
    assert!(events.iter().any(|event| matches!(
        event,
        RunEvent::Failed { id, .. } if *id == test_b
    )));

    assert_eq!(report.stats.passed, 1);
    assert_eq!(report.stats.failed, 2);
    assert_eq!(report.stats.package_failures, 1);
    assert!(!report.cancelled);

    // The subtest was created by this run and announced to subscribers.
    assert!(is_dynamic(&explorer, &case_1));
    assert!(matches!(rx.recv().await?, ExplorerEvent::ItemsChanged(_)));

    explorer.invalidate_run(report.run_id);
    assert_eq!(explorer.model().find(&case_1).map(|_| ()), None);
    Ok(())
}

#[tokio::test]
async fn cancelled_request_spawns_nothing() -> Result<()> {
    let Fixture {
        _dir,
        mut explorer,
        runner,
        ..
    } = fixture().await?;
    let request = ResolvedRunRequest::resolve(
        explorer.model(),
        &RunSelection::default(),
        explorer.run_policy(),
    )?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut events = Vec::new();
    let report = explorer
        .run_tests(&runner, &request, &cancel, |event| events.push(event))
        .await?;

    assert!(report.cancelled);
    assert_eq!(events, vec![]);
    assert_eq!(report.stats.finished_count(), 0);
    Ok(())
}
