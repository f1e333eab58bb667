// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for gotest-runner.

use camino::{Utf8Path, Utf8PathBuf};
use std::process::ExitStatus;
use url::Url;

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "package" if `count` is 1, otherwise "packages".
    pub fn packages_str(count: usize) -> &'static str {
        if count == 1 { "package" } else { "packages" }
    }
}

/// Converts an absolute path into a `file://` URI.
pub fn path_to_uri(path: &Utf8Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// Converts a `file://` URI into a path.
pub fn uri_to_path(uri: &str) -> Option<Utf8PathBuf> {
    let url = Url::parse(uri).ok()?;
    let path = url.to_file_path().ok()?;
    Utf8PathBuf::from_path_buf(path).ok()
}

/// Returns the URI of the directory containing `uri`.
pub(crate) fn parent_uri(uri: &str) -> &str {
    match uri.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => uri,
    }
}

/// Returns the last path segment of a URI, decoded where possible.
pub(crate) fn uri_base_name(uri: &str) -> String {
    if let Some(name) = uri_to_path(uri).as_deref().and_then(Utf8Path::file_name) {
        return name.to_owned();
    }
    let trimmed = uri.trim_end_matches('/');
    trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(_, name)| name)
        .to_owned()
}

/// Returns true if the directory `dir_uri` contains `uri`, at any depth.
pub(crate) fn uri_is_within(uri: &str, dir_uri: &str) -> bool {
    let dir_uri = dir_uri.trim_end_matches('/');
    uri.strip_prefix(dir_uri)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Compares two URIs, ignoring a trailing slash.
pub(crate) fn same_dir_uri(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Describes how a process exited.
pub(crate) fn display_exited_with(exit_status: ExitStatus) -> String {
    if let Some(code) = exit_status.code() {
        return format!("exited with exit code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(sig) = exit_status.signal() {
            return match signal_str(sig) {
                Some(s) => format!("aborted with signal {sig} (SIG{s})"),
                None => format!("aborted with signal {sig}"),
            };
        }
    }

    "exited with an unknown error".to_owned()
}

#[cfg(unix)]
fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS, FreeBSD and illumos.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}
