// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced while running tests.

use crate::model::{ItemEvent, ItemId, RunId};
use gotest_metadata::Location;
use serde::Serialize;
use std::fmt;

/// A message attached to a failed or errored result.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestMessage {
    /// The message text.
    pub message: String,

    /// Where the message was reported, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    /// For comparison failures, the expected output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    /// For comparison failures, the actual output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl TestMessage {
    /// Creates a plain message.
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
            expected: None,
            actual: None,
        }
    }
}

/// A status change or output line for an item in a run.
///
/// Events about a package item (as opposed to a test) describe the package process as a whole.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum RunEvent {
    /// The item started running.
    Started {
        /// The item.
        id: ItemId,
    },

    /// The item printed a line of output.
    Output {
        /// The item the line is attributed to.
        id: ItemId,

        /// The line, including any trailing newline.
        line: String,

        /// The source location the line refers to, if known.
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },

    /// The item passed.
    Passed {
        /// The item.
        id: ItemId,

        /// How long the item took, in milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },

    /// The item failed.
    Failed {
        /// The item.
        id: ItemId,

        /// The failure messages.
        messages: Vec<TestMessage>,

        /// How long the item took, in milliseconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },

    /// The item was skipped.
    Skipped {
        /// The item.
        id: ItemId,
    },

    /// The item could not run to completion: it failed to build, the process died, or the test
    /// never finished.
    Errored {
        /// The item.
        id: ItemId,

        /// The error messages.
        messages: Vec<TestMessage>,
    },

    /// Dynamic subtests were created in the model.
    ItemsChanged {
        /// The model events.
        #[serde(serialize_with = "serialize_item_events")]
        events: Vec<ItemEvent>,
    },
}

impl RunEvent {
    /// Returns the item the event is about, if it is about a single item.
    pub fn id(&self) -> Option<&ItemId> {
        match self {
            Self::Started { id }
            | Self::Output { id, .. }
            | Self::Passed { id, .. }
            | Self::Failed { id, .. }
            | Self::Skipped { id }
            | Self::Errored { id, .. } => Some(id),
            Self::ItemsChanged { .. } => None,
        }
    }
}

fn serialize_item_events<S>(events: &[ItemEvent], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(events.iter().map(|event| event.to_string()))
}

/// Counts of results in a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStats {
    /// The number of packages that were run.
    pub packages: usize,

    /// Tests that passed.
    pub passed: usize,

    /// Tests that failed.
    pub failed: usize,

    /// Tests that were skipped.
    pub skipped: usize,

    /// Tests that errored.
    pub errored: usize,

    /// Packages that failed or errored as a whole.
    pub package_failures: usize,
}

impl RunStats {
    /// Updates the counts for `event`.
    pub fn on_event(&mut self, event: &RunEvent) {
        let Some(id) = event.id() else {
            return;
        };
        let is_test = matches!(id.kind(), crate::model::ItemKind::Test(_));
        match event {
            RunEvent::Passed { .. } if is_test => self.passed += 1,
            RunEvent::Failed { .. } if is_test => self.failed += 1,
            RunEvent::Skipped { .. } if is_test => self.skipped += 1,
            RunEvent::Errored { .. } if is_test => self.errored += 1,
            RunEvent::Failed { .. } | RunEvent::Errored { .. } => self.package_failures += 1,
            _ => {}
        }
    }

    /// Returns true if anything failed or errored.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errored > 0 || self.package_failures > 0
    }

    /// Returns the number of tests that reached a final state.
    pub fn finished_count(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errored
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::helpers::plural;

        let finished = self.finished_count();
        write!(
            f,
            "{finished} {} run across {} {}: {} passed, {} failed, {} skipped, {} errored",
            plural::tests_str(finished),
            self.packages,
            plural::packages_str(self.packages),
            self.passed,
            self.failed,
            self.skipped,
            self.errored,
        )?;
        if self.package_failures > 0 {
            write!(
                f,
                " ({} {} failed as a whole)",
                self.package_failures,
                plural::packages_str(self.package_failures)
            )?;
        }
        Ok(())
    }
}

/// The outcome of a completed run.
#[derive(Copy, Clone, Debug)]
pub struct RunReport {
    /// The run, which owns any dynamic subtests it created.
    pub run_id: RunId,

    /// Counts of results.
    pub stats: RunStats,

    /// True if the run was cancelled before it finished.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn stats_count_tests_and_packages_separately() {
        let test = ItemId::test("file:///src/foo/x_test.go", TestKind::Test, "TestFoo");
        let package = ItemId::package("file:///src/foo");

        let mut stats = RunStats {
            packages: 1,
            ..RunStats::default()
        };
        for event in [
            RunEvent::Started { id: test.clone() },
            RunEvent::Failed {
                id: test.clone(),
                messages: vec![],
                elapsed_ms: Some(5),
            },
            RunEvent::Failed {
                id: package,
                messages: vec![],
                elapsed_ms: None,
            },
        ] {
            stats.on_event(&event);
        }

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.package_failures, 1);
        assert!(stats.has_failures());
        assert_eq!(
            stats.to_string(),
            "1 test run across 1 package: 0 passed, 1 failed, 0 skipped, 0 errored \
             (1 package failed as a whole)"
        );
    }

    #[test]
    fn events_serialize_with_string_ids() {
        let event = RunEvent::Passed {
            id: ItemId::test("file:///src/foo/x_test.go", TestKind::Test, "TestFoo"),
            elapsed_ms: Some(250),
        };
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({
                "type": "passed",
                "id": "file:///src/foo/x_test.go?test#TestFoo",
                "elapsed-ms": 250,
            })
        );
    }
}
