// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted by `go test -json`.
//!
//! Each line of standard output is a single JSON object. See `go doc test2json` for the full
//! description of the format.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

/// A single event produced by `go test -json`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GoTestEvent {
    /// The time at which the event was produced, in RFC 3339 format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// What happened.
    pub action: GoTestAction,

    /// The package import path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// The test this event refers to. Absent for package-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<SmolStr>,

    /// Elapsed time in seconds, for `pass`, `fail` and `skip` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,

    /// Output text, for `output` and `build-output` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// For `build-output` and `build-fail` events, the package being built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
}

impl GoTestEvent {
    /// Creates an event with only an action set.
    pub fn new(action: GoTestAction) -> Self {
        Self {
            time: None,
            action,
            package: None,
            test: None,
            elapsed: None,
            output: None,
            import_path: None,
        }
    }

    /// Sets the test name.
    pub fn with_test(mut self, test: impl Into<SmolStr>) -> Self {
        self.test = Some(test.into());
        self
    }

    /// Sets the output text.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Sets the elapsed time, in seconds.
    pub fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Parses a single line of `go test -json` output.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Returns the elapsed time as a duration, if present and representable.
    pub fn elapsed_duration(&self) -> Option<Duration> {
        self.elapsed
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// The action of a [`GoTestEvent`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoTestAction {
    /// The test binary is about to be executed.
    Start,

    /// A test has started running.
    Run,

    /// A test has been paused.
    Pause,

    /// A paused test has continued running.
    Cont,

    /// A test passed.
    Pass,

    /// A benchmark printed log output but did not fail.
    Bench,

    /// A test or benchmark failed.
    Fail,

    /// A test printed output.
    Output,

    /// A test was skipped or the package contained no tests.
    Skip,

    /// The toolchain printed build output.
    BuildOutput,

    /// The package failed to build.
    BuildFail,

    /// An action not known to this version.
    #[serde(other)]
    Unknown,
}
