// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use color_eyre::eyre::{Result, bail, ensure};
use gotest_runner::{
    config::ExplorerConfig,
    discovery::SnapshotDiscovery,
    explorer::{Explorer, ExplorerEvent},
    model::{ItemEvent, ItemEventKind, ItemId, TestKind},
};
use pretty_assertions::assert_eq;

fn labels(explorer: &Explorer<SnapshotDiscovery>, parent: &ItemId) -> Vec<String> {
    let resolver = explorer.resolver();
    resolver
        .children(Some(parent))
        .iter()
        .filter_map(|id| resolver.label(id))
        .collect()
}

fn module_id() -> ItemId {
    ItemId::module(format!("{FOO}/go.mod"))
}

async fn foo_bar_explorer() -> Result<Explorer<SnapshotDiscovery>> {
    let mut explorer = Explorer::new(
        SnapshotDiscovery::new(foo_bar_snapshot()),
        &ExplorerConfig::default(),
    );
    explorer.add_workspace(Utf8Path::new("/src")).await?;
    Ok(explorer)
}

fn position(events: &[ItemEvent], kind: ItemEventKind, id: &ItemId) -> Option<usize> {
    events
        .iter()
        .position(|event| event.kind == kind && &event.id == id)
}

#[tokio::test]
async fn discover_then_remove_file() -> Result<()> {
    let mut explorer = foo_bar_explorer().await?;

    // The workspace has no packages of its own, so only its module is shown.
    assert_eq!(explorer.resolver().children(None), vec![module_id()]);
    assert_eq!(labels(&explorer, &module_id()), vec!["bar", "TestFoo"]);

    let bar = ItemId::package(format!("{FOO}/bar"));
    let test_bar = ItemId::test(format!("{FOO}/bar/bar_test.go"), TestKind::Test, "TestBar");
    assert_eq!(explorer.resolver().children(Some(&bar)), vec![test_bar.clone()]);

    let mut rx = explorer.subscribe();
    explorer.discovery_mut().set_snapshot(foo_only_snapshot());
    explorer.refresh_all().await?;

    let ExplorerEvent::ItemsChanged(events) = rx.recv().await? else {
        bail!("expected an items-changed notification");
    };
    let test_removed = position(&events, ItemEventKind::Removed, &test_bar);
    let package_removed = position(&events, ItemEventKind::Removed, &bar);
    ensure!(
        matches!((test_removed, package_removed), (Some(t), Some(p)) if t < p),
        "TestBar must be removed before its package: {events:?}"
    );

    assert_eq!(labels(&explorer, &module_id()), vec!["TestFoo"]);
    Ok(())
}

#[tokio::test]
async fn refresh_without_changes_is_silent() -> Result<()> {
    let mut explorer = foo_bar_explorer().await?;
    let mut rx = explorer.subscribe();
    explorer.refresh_all().await?;
    ensure!(rx.try_recv().is_err(), "no notifications expected");
    Ok(())
}

#[tokio::test]
async fn opening_a_new_file_keeps_other_packages() -> Result<()> {
    let mut explorer = foo_bar_explorer().await?;

    let baz_uri = format!("{FOO}/baz_test.go");
    let mut snapshot = foo_bar_snapshot();
    snapshot.packages[0]
        .test_files
        .push(test_file(&baz_uri, &[("TestBaz", 3, 9)]));
    explorer.discovery_mut().set_snapshot(snapshot);

    let mut rx = explorer.subscribe();
    explorer.did_open(&baz_uri).await?;

    let ExplorerEvent::ItemsChanged(events) = rx.recv().await? else {
        bail!("expected an items-changed notification");
    };
    assert_eq!(events, vec![ItemEvent::added(ItemId::file(baz_uri.clone()))]);
    assert_eq!(
        labels(&explorer, &module_id()),
        vec!["bar", "TestFoo", "TestBaz"]
    );
    Ok(())
}

#[tokio::test]
async fn deleting_a_file_removes_its_tests() -> Result<()> {
    let mut explorer = foo_bar_explorer().await?;
    let mut rx = explorer.subscribe();

    let file = format!("{FOO}/foo_test.go");
    explorer.did_delete(&file);

    let ExplorerEvent::ItemsChanged(events) = rx.recv().await? else {
        bail!("expected an items-changed notification");
    };
    assert_eq!(
        events,
        vec![
            ItemEvent::removed(ItemId::test(file.clone(), TestKind::Test, "TestFoo")),
            ItemEvent::removed(ItemId::file(file)),
            ItemEvent::removed(ItemId::package(FOO)),
        ]
    );
    assert_eq!(labels(&explorer, &module_id()), vec!["bar"]);
    Ok(())
}
