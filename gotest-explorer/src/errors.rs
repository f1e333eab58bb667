// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use gotest_metadata::ExplorerExitCode;
use gotest_runner::errors::{ConfigParseError, DiscoveryError, ResolveError, RunTestsError};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are printed through display_to_stderr.

/// An error with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("discovery failed")]
    DiscoveryFailed {
        #[from]
        err: DiscoveryError,
    },
    #[error("failed to resolve items")]
    ResolveFailed {
        #[from]
        err: ResolveError,
    },
    #[error("failed to create async runtime")]
    RuntimeCreateError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed to complete")]
    RunTestsError {
        #[from]
        err: RunTestsError,
    },
    #[error("writing output failed")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("serializing output failed")]
    SerializeOutputError {
        #[source]
        err: serde_json::Error,
    },
    #[error("no tests to run")]
    NoTestsRun { workspaces: Vec<Utf8PathBuf> },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    pub(crate) fn serialize_output(err: serde_json::Error) -> Self {
        Self::SerializeOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ResolveFailed { .. }
            | Self::RuntimeCreateError { .. } => ExplorerExitCode::SETUP_ERROR,
            Self::DiscoveryFailed { .. } => ExplorerExitCode::DISCOVERY_FAILED,
            Self::RunTestsError { .. } => ExplorerExitCode::TEST_PROCESS_FAILED,
            Self::WriteOutputError { .. } | Self::SerializeOutputError { .. } => {
                ExplorerExitCode::WRITE_OUTPUT_ERROR
            }
            Self::NoTestsRun { .. } => ExplorerExitCode::NO_TESTS_RUN,
            Self::TestRunFailed => ExplorerExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirInvalid { err } => {
                error!("could not read the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                match err.config_file() {
                    Some(file) => error!(
                        "failed to parse config file at `{}`",
                        file.style(styles.bold)
                    ),
                    None => error!("failed to parse config"),
                }
                err.source()
            }
            Self::DiscoveryFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::ResolveFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::RuntimeCreateError { err } => {
                error!("failed to create the async runtime");
                Some(err as &dyn Error)
            }
            Self::RunTestsError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::SerializeOutputError { err } => {
                error!("failed to serialize output");
                Some(err as &dyn Error)
            }
            Self::NoTestsRun { workspaces } => {
                let workspaces: Vec<String> = workspaces
                    .iter()
                    .map(|dir| dir.style(styles.bold).to_string())
                    .collect();
                error!("no tests to run in {}", workspaces.join(", "));
                None
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
