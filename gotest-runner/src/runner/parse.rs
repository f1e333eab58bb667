// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristics over the unstructured text printed by tests and the Go toolchain.

use super::TestMessage;
use gotest_metadata::{Location, Position, Range};
use regex::Regex;
use std::sync::LazyLock;

// `file.go:12: message` or `file.go:12:5: message`, optionally indented. Compiler errors prefix the
// file with `./`.
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<file>(?:[A-Za-z]:)?[^\s:]+\.go):(?P<line>\d+)(?::(?P<col>\d+))?:\s?(?P<message>.*)$")
        .expect("location regex is valid")
});

static BANNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:=== (?:RUN|PAUSE|CONT|NAME)\s|--- (?:PASS|FAIL|SKIP|BENCH):)")
        .expect("banner regex is valid")
});

// `BenchmarkFoo-8   1000000   1234 ns/op ...`. The name is sometimes printed separately.
static BENCHMARK_RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:Benchmark\S*\s+)?\d+\s+[\d.]+\s*ns/op")
        .expect("benchmark regex is valid")
});

static BUILD_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:build|setup) failed\]").expect("build failure regex is valid")
});

/// A line of the form `file.go:line[:col]: message`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct LocatedLine<'a> {
    /// The file as printed: a base name, a relative path or an absolute path.
    pub(crate) file: &'a str,

    /// The one-based line.
    pub(crate) line: u32,

    /// The one-based column, if printed.
    pub(crate) column: Option<u32>,

    /// The rest of the line.
    pub(crate) message: &'a str,
}

impl LocatedLine<'_> {
    /// Converts the printed one-based position into a zero-based location in `uri`.
    pub(crate) fn to_location(&self, uri: String) -> Location {
        let position = Position::new(
            self.line.saturating_sub(1),
            self.column.map_or(0, |column| column.saturating_sub(1)),
        );
        Location {
            uri,
            range: Range::point(position),
        }
    }
}

pub(crate) fn parse_located_line(line: &str) -> Option<LocatedLine<'_>> {
    let captures = LOCATION_RE.captures(line.trim_end_matches(['\r', '\n']))?;
    let file = captures.name("file")?.as_str();
    Some(LocatedLine {
        file,
        line: captures.name("line")?.as_str().parse().ok()?,
        column: captures
            .name("col")
            .and_then(|col| col.as_str().parse().ok()),
        message: captures.name("message").map_or("", |m| m.as_str()),
    })
}

/// Returns true for the `=== RUN` and `--- FAIL:` lines printed by the test framework.
pub(crate) fn is_banner(line: &str) -> bool {
    BANNER_RE.is_match(line)
}

/// Returns true for a line reporting benchmark results.
pub(crate) fn is_benchmark_result(line: &str) -> bool {
    BENCHMARK_RESULT_RE.is_match(line)
}

/// Returns true for the summary line printed when a package fails to build.
pub(crate) fn is_build_failure(line: &str) -> bool {
    BUILD_FAILED_RE.is_match(line)
}

/// Extracts located messages from a test's output.
///
/// A located line starts a new message. Indented lines that follow it are continuations of that
/// message. `resolve` maps a printed file name to a URI; lines whose file does not resolve are
/// treated as plain text.
pub(crate) fn located_messages(
    lines: &[String],
    resolve: impl Fn(&str) -> Option<String>,
) -> Vec<TestMessage> {
    let mut messages: Vec<TestMessage> = Vec::new();
    let mut continuing = false;
    for line in lines {
        if is_banner(line) {
            continuing = false;
            continue;
        }
        if let Some(located) = parse_located_line(line) {
            if let Some(uri) = resolve(located.file) {
                messages.push(TestMessage::new(
                    located.message,
                    Some(located.to_location(uri)),
                ));
                continuing = true;
                continue;
            }
        }
        let text = line.trim_end_matches(['\r', '\n']);
        match messages.last_mut() {
            Some(message) if continuing && text.starts_with(char::is_whitespace) => {
                message.message.push('\n');
                message.message.push_str(text.trim());
            }
            _ => continuing = false,
        }
    }
    messages
}

/// Joins a test's output into a single unlocated message, leaving out framework banners.
pub(crate) fn plain_message(lines: &[String]) -> Option<TestMessage> {
    let text: String = lines
        .iter()
        .filter(|line| !is_banner(line))
        .map(String::as_str)
        .collect();
    let text = text.trim_end();
    (!text.is_empty()).then(|| TestMessage::new(text, None))
}

/// For a failed example, builds a comparison message from its `got:` and `want:` sections.
pub(crate) fn example_diff(lines: &[String]) -> Option<TestMessage> {
    #[derive(Copy, Clone)]
    enum Section {
        None,
        Got,
        Want,
    }

    let mut section = Section::None;
    let mut got = String::new();
    let mut want = String::new();
    let mut seen_got = false;
    let mut seen_want = false;
    for line in lines {
        if is_banner(line) {
            section = Section::None;
            continue;
        }
        match line.trim_end() {
            "got:" => {
                section = Section::Got;
                seen_got = true;
            }
            "want:" => {
                section = Section::Want;
                seen_want = true;
            }
            _ => match section {
                Section::Got => got.push_str(line),
                Section::Want => want.push_str(line),
                Section::None => {}
            },
        }
    }

    if !(seen_got && seen_want) {
        return None;
    }
    let got = got.trim_end().to_owned();
    let want = want.trim_end().to_owned();
    Some(TestMessage {
        message: format!("got:\n{got}\nwant:\n{want}"),
        location: None,
        expected: Some(want),
        actual: Some(got),
    })
}
