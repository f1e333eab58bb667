// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gotest-runner.

use crate::model::ItemId;
use camino::Utf8PathBuf;
use config::ConfigError;
use gotest_metadata::CommandError;
use std::borrow::Cow;
use thiserror::Error;

pub use display_error_chain::DisplayErrorChain;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error(
    "failed to parse gotest-explorer config{}",
    .config_file.as_ref().map_or(String::new(), |file| format!(" at `{file}`"))
)]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the config file that failed to parse, if one was involved.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building or deserializing the layered config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config, at a known key path.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// An `exclude` pattern was not a valid glob.
    #[error("invalid exclude pattern `{pattern}`")]
    InvalidExcludeGlob {
        /// The pattern that failed to parse.
        pattern: String,

        /// The underlying error.
        #[source]
        err: globset::Error,
    },

    /// `test-threads` was zero.
    #[error("test-threads must be greater than zero")]
    ZeroTestThreads,
}

/// An error returned while parsing an [`ItemId`] from a string.
#[derive(Clone, Debug, Error)]
#[error("invalid item ID `{input}`: {reason}")]
pub struct ItemIdParseError {
    input: String,
    reason: Cow<'static, str>,
}

impl ItemIdParseError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An error that occurred while querying the discovery service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The external discovery command failed.
    #[error("discovery command failed")]
    Command(#[source] CommandError),

    /// The discovery query could not be serialized.
    #[error("failed to serialize `{operation}` query")]
    QuerySerialize {
        /// The discovery operation.
        operation: &'static str,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// A discovery snapshot could not be read.
    #[error("failed to read discovery snapshot at `{path}`")]
    SnapshotRead {
        /// The snapshot path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A discovery snapshot could not be parsed.
    #[error("failed to parse discovery snapshot at `{path}`")]
    SnapshotParse {
        /// The snapshot path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// A workspace directory could not be expressed as a `file://` URI.
    #[error("workspace directory `{dir}` is not an absolute path")]
    InvalidWorkspaceDir {
        /// The directory.
        dir: Utf8PathBuf,
    },
}

/// An error that occurred while mapping requested items back to the model.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// An item ID failed to parse.
    #[error(transparent)]
    InvalidId(#[from] ItemIdParseError),

    /// A requested item is not present in the model.
    #[error("item `{id}` was not found")]
    NotFound {
        /// The requested item.
        id: ItemId,
    },
}

/// An error that occurred while spawning a test process.
#[derive(Debug, Error)]
#[error("failed to spawn `{program}` in `{dir}`")]
pub struct SpawnError {
    program: String,
    dir: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl SpawnError {
    pub(crate) fn new(program: impl Into<String>, dir: Utf8PathBuf, err: std::io::Error) -> Self {
        Self {
            program: program.into(),
            dir,
            err,
        }
    }
}

/// An error that aborted a test run as a whole.
///
/// Failures of individual package processes are not errors at this level: they are reported as
/// [`RunEvent::Errored`](crate::runner::RunEvent::Errored) on the package item.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunTestsError {
    /// The run request could not be resolved.
    #[error("failed to resolve run request")]
    Resolve(#[from] ResolveError),

    /// A package task panicked.
    #[error("task for package `{package}` panicked")]
    TaskPanicked {
        /// The package whose task panicked.
        package: ItemId,

        /// The underlying join error.
        #[source]
        err: tokio::task::JoinError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_chain_includes_sources() {
        let err = ConfigParseError::new(
            Some("/src/.config/gotest-explorer.toml".into()),
            ConfigParseErrorKind::ZeroTestThreads,
        );
        let rendered = DisplayErrorChain::new(&err).to_string();
        assert!(
            rendered.starts_with(
                "failed to parse gotest-explorer config at `/src/.config/gotest-explorer.toml`"
            ),
            "rendered: {rendered}"
        );
        assert!(
            rendered.contains("test-threads must be greater than zero"),
            "rendered: {rendered}"
        );
    }
}
