// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while running an external discovery command.
#[derive(Debug)]
pub enum CommandError {
    /// Executing the process resulted in an error.
    Exec {
        /// The program that was executed.
        program: String,

        /// The underlying I/O error.
        err: std::io::Error,
    },

    /// The command exited with a non-zero code.
    CommandFailed {
        /// The program that was executed.
        program: String,

        /// The exit code for the process, or `None` if it was terminated by a signal.
        exit_code: Option<i32>,

        /// Standard error for the process.
        stderr: Vec<u8>,
    },

    /// Error parsing JSON output.
    Json {
        /// The program that was executed.
        program: String,

        /// The underlying JSON error.
        err: serde_json::Error,
    },
}

impl CommandError {
    /// Returns the program that was executed.
    pub fn program(&self) -> &str {
        match self {
            Self::Exec { program, .. }
            | Self::CommandFailed { program, .. }
            | Self::Json { program, .. } => program,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exec { program, .. } => {
                write!(f, "`{program}` process execution failed")
            }
            Self::CommandFailed {
                program,
                exit_code,
                stderr,
            } => {
                let exit_code_str =
                    exit_code.map_or(String::new(), |code| format!(" with exit code {code}"));
                let stderr = String::from_utf8_lossy(stderr);
                write!(f, "`{program}` failed{exit_code_str}, stderr:\n{stderr}\n")
            }
            Self::Json { program, .. } => {
                write!(f, "parsing `{program}` JSON output failed")
            }
        }
    }
}

impl error::Error for CommandError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Exec { err, .. } => Some(err),
            Self::CommandFailed { .. } => None,
            Self::Json { err, .. } => Some(err),
        }
    }
}
