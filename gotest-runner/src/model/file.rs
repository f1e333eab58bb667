// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{InstanceId, ItemEvent, ItemId, TestCase};
use crate::item_set::{ItemSet, Keyed, SetMember};
use gotest_metadata::{Range, TestFileRecord};
use smol_str::SmolStr;

/// A `_test.go` file and the tests declared in it.
#[derive(Clone, Debug)]
pub struct TestFile {
    instance: InstanceId,
    uri: SmolStr,
    tests: ItemSet<TestCase>,
}

impl TestFile {
    pub(crate) fn new(record: &TestFileRecord) -> Self {
        let mut file = Self {
            instance: InstanceId::next(),
            uri: record.uri.as_str().into(),
            tests: ItemSet::new(),
        };
        file.update(record, &[]);
        file
    }

    /// Returns the stable ID of this file.
    pub fn id(&self) -> ItemId {
        ItemId::file(self.uri.clone())
    }

    /// Returns the identity of this particular object.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Returns the file URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the tests in this file, static tests in declaration order followed by dynamic
    /// tests in creation order.
    pub fn tests(&self) -> &ItemSet<TestCase> {
        &self.tests
    }

    pub(crate) fn tests_mut(&mut self) -> &mut ItemSet<TestCase> {
        &mut self.tests
    }

    /// Reconciles this file's tests against a fresh record.
    ///
    /// Dynamic tests are kept even though the record doesn't mention them; the owning package
    /// decides separately whether their parents were reloaded.
    pub(crate) fn update(&mut self, record: &TestFileRecord, edits: &[Range]) -> Vec<ItemEvent> {
        let uri = self.uri.clone();
        self.tests.update(
            &record.tests,
            |record| TestCase::new_static(record, &uri),
            |record, test| test.update_static(record, edits),
            TestCase::is_dynamic,
        )
    }
}

impl Keyed for TestFile {
    fn key(&self) -> &str {
        &self.uri
    }
}

impl Keyed for TestFileRecord {
    fn key(&self) -> &str {
        &self.uri
    }
}

impl SetMember for TestFile {
    type Event = ItemEvent;

    fn added_events(&self, events: &mut Vec<ItemEvent>) {
        events.push(ItemEvent::added(self.id()));
    }

    fn removed_events(&self, events: &mut Vec<ItemEvent>) {
        for test in &self.tests {
            test.removed_events(events);
        }
        events.push(ItemEvent::removed(self.id()));
    }
}
