// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `gotest-explorer` failures.
///
/// Runs may fail for a variety of reasons. This structure documents the exit codes that may occur
/// in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum ExplorerExitCode {}

impl ExplorerExitCode {
    /// No errors occurred and the explorer exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// The discovery service failed or returned malformed data.
    pub const DISCOVERY_FAILED: i32 = 102;

    /// One or more tests failed or errored.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A test process could not be spawned or exited abnormally.
    pub const TEST_PROCESS_FAILED: i32 = 101;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up an invocation, for example an invalid config file or
    /// an unresolvable item ID.
    pub const SETUP_ERROR: i32 = 96;
}
