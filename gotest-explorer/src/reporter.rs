// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human and JSON renderings of the presented tree and of run events.

use clap::ValueEnum;
use gotest_runner::{
    model::{ItemId, ItemKind, TestModel},
    presenter::PresentedItem,
    run_request::ResolvedRunRequest,
    runner::{RunEvent, RunReport, TestMessage},
};
use owo_colors::{OwoColorize, Style, style};
use std::{collections::HashMap, io, io::Write, time::Duration};
use swrite::{SWrite, swrite};

/// The format used for command output.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum MessageFormat {
    /// Human-readable output.
    #[default]
    Human,

    /// One JSON document per line.
    Json,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Styles {
    container: Style,
    dynamic: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    count: Style,
    package: Style,
}

impl Styles {
    pub(crate) fn colorize(&mut self) {
        self.container = style().bold();
        self.dynamic = style().dimmed();
        self.pass = style().green().bold();
        self.fail = style().red().bold();
        self.skip = style().yellow().bold();
        self.count = style().bold();
        self.package = style().magenta().bold();
    }
}

/// Writes the presented tree, one item per line, indented by depth.
pub(crate) fn write_tree(
    items: &[PresentedItem],
    styles: &Styles,
    writer: &mut dyn Write,
) -> io::Result<()> {
    fn write_item(
        item: &PresentedItem,
        depth: usize,
        styles: &Styles,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let indent = "    ".repeat(depth);
        let style = if item.is_container() {
            styles.container
        } else if item.dynamic {
            styles.dynamic
        } else {
            Style::new()
        };
        writeln!(writer, "{indent}{}", item.label.style(style))?;
        for child in &item.children {
            write_item(child, depth + 1, styles, writer)?;
        }
        Ok(())
    }

    for item in items {
        write_item(item, 0, styles, writer)?;
    }
    Ok(())
}

/// Prints run events as they arrive.
pub(crate) struct RunReporter {
    format: MessageFormat,
    styles: Styles,
    verbose: bool,
    // Package import paths, keyed by package directory and by test file URI.
    package_paths: HashMap<String, String>,
}

impl RunReporter {
    pub(crate) fn new(
        model: &TestModel,
        request: &ResolvedRunRequest,
        format: MessageFormat,
        styles: Styles,
        verbose: bool,
    ) -> Self {
        let mut package_paths = HashMap::new();
        for id in request.packages() {
            let Some(p) = model.package(id) else {
                continue;
            };
            let path = p.package.path().to_owned();
            for file in p.package.files() {
                package_paths.insert(file.uri().to_owned(), path.clone());
            }
            package_paths.insert(id.uri().to_owned(), path);
        }
        Self {
            format,
            styles,
            verbose,
            package_paths,
        }
    }

    pub(crate) fn write_event(&self, event: &RunEvent, writer: &mut dyn Write) -> io::Result<()> {
        if self.format == MessageFormat::Json {
            serde_json::to_writer(&mut *writer, event)?;
            return writeln!(writer);
        }

        match event {
            RunEvent::Started { id } => {
                if self.verbose && is_test(id) {
                    writeln!(writer, "{:>12} {}", "START".style(self.styles.pass), self.label(id))?;
                }
            }
            RunEvent::Output { line, .. } => {
                if self.verbose {
                    write!(writer, "{line}")?;
                }
            }
            RunEvent::Passed { id, elapsed_ms } => {
                if is_test(id) {
                    writeln!(
                        writer,
                        "{:>12} {}{}",
                        "PASS".style(self.styles.pass),
                        elapsed_str(*elapsed_ms),
                        self.label(id),
                    )?;
                }
            }
            RunEvent::Failed {
                id,
                messages,
                elapsed_ms,
            } => {
                writeln!(
                    writer,
                    "{:>12} {}{}",
                    "FAIL".style(self.styles.fail),
                    elapsed_str(*elapsed_ms),
                    self.label(id),
                )?;
                write_messages(messages, writer)?;
            }
            RunEvent::Skipped { id } => {
                if is_test(id) {
                    writeln!(writer, "{:>12} {}", "SKIP".style(self.styles.skip), self.label(id))?;
                }
            }
            RunEvent::Errored { id, messages } => {
                writeln!(writer, "{:>12} {}", "ERROR".style(self.styles.fail), self.label(id))?;
                write_messages(messages, writer)?;
            }
            RunEvent::ItemsChanged { .. } => {}
        }
        Ok(())
    }

    pub(crate) fn write_summary(
        &self,
        report: &RunReport,
        elapsed: Duration,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        if self.format == MessageFormat::Json {
            serde_json::to_writer(&mut *writer, &report.stats)?;
            return writeln!(writer);
        }

        writeln!(writer, "------------")?;
        let heading_style = if report.stats.has_failures() {
            self.styles.fail
        } else {
            self.styles.pass
        };
        let heading = if report.cancelled {
            "Cancelled"
        } else {
            "Summary"
        };
        writeln!(
            writer,
            "{:>12} [{:>8.3}s] {}",
            heading.style(heading_style),
            elapsed.as_secs_f64(),
            report.stats.style(self.styles.count),
        )
    }

    fn label(&self, id: &ItemId) -> String {
        let mut out = String::new();
        match id.kind() {
            ItemKind::Test(_) => {
                if let Some(path) = self.package_paths.get(id.uri()) {
                    swrite!(out, "{} ", path.style(self.styles.package));
                }
                swrite!(out, "{}", id.name().unwrap_or_default());
            }
            _ => match self.package_paths.get(id.uri()) {
                Some(path) => swrite!(out, "{}", path.style(self.styles.package)),
                None => swrite!(out, "{id}"),
            },
        }
        out
    }
}

fn is_test(id: &ItemId) -> bool {
    matches!(id.kind(), ItemKind::Test(_))
}

fn elapsed_str(elapsed_ms: Option<u64>) -> String {
    match elapsed_ms {
        Some(ms) => format!("[{:>8.3}s] ", Duration::from_millis(ms).as_secs_f64()),
        None => String::new(),
    }
}

fn write_messages(messages: &[TestMessage], writer: &mut dyn Write) -> io::Result<()> {
    for message in messages {
        let location = message.location.as_ref().map(|location| {
            let file = location.uri.rsplit('/').next().unwrap_or(&location.uri);
            format!("{file}:{}: ", location.range.start.line + 1)
        });
        for (i, line) in message.message.lines().enumerate() {
            match (&location, i) {
                (Some(location), 0) => writeln!(writer, "    {location}{line}")?,
                _ => writeln!(writer, "    {line}")?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotest_metadata::{Location, Position, Range};
    use gotest_runner::{model::TestKind, runner::RunStats};
    use pretty_assertions::assert_eq;

    const FILE: &str = "file:///src/foo/x_test.go";

    fn reporter(format: MessageFormat, verbose: bool) -> RunReporter {
        RunReporter {
            format,
            styles: Styles::default(),
            verbose,
            package_paths: [
                (FILE.to_owned(), "example.com/foo".to_owned()),
                ("file:///src/foo".to_owned(), "example.com/foo".to_owned()),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn render(reporter: &RunReporter, events: &[RunEvent]) -> String {
        let mut out = Vec::new();
        for event in events {
            reporter.write_event(event, &mut out).expect("writing to a Vec succeeds");
        }
        String::from_utf8(out).expect("output is UTF-8")
    }

    #[test]
    fn human_output() {
        let test = ItemId::test(FILE, TestKind::Test, "TestFoo");
        let events = [
            RunEvent::Started { id: test.clone() },
            RunEvent::Output {
                id: test.clone(),
                line: "=== RUN   TestFoo\n".to_owned(),
                location: None,
            },
            RunEvent::Failed {
                id: test.clone(),
                messages: vec![TestMessage::new(
                    "values differ\nwant 1",
                    Some(Location {
                        uri: FILE.to_owned(),
                        range: Range::point(Position::new(11, 0)),
                    }),
                )],
                elapsed_ms: Some(1500),
            },
            RunEvent::Failed {
                id: ItemId::package("file:///src/foo"),
                messages: vec![],
                elapsed_ms: None,
            },
        ];

        assert_eq!(
            render(&reporter(MessageFormat::Human, false), &events),
            "        FAIL [   1.500s] example.com/foo TestFoo\n\
             \x20   x_test.go:12: values differ\n\
             \x20   want 1\n\
             \x20       FAIL example.com/foo\n"
        );
        assert!(
            render(&reporter(MessageFormat::Human, true), &events)
                .contains("       START example.com/foo TestFoo\n=== RUN   TestFoo\n")
        );
    }

    #[test]
    fn json_output() {
        let event = RunEvent::Skipped {
            id: ItemId::test(FILE, TestKind::Test, "TestFoo"),
        };
        assert_eq!(
            render(&reporter(MessageFormat::Json, false), &[event]),
            "{\"type\":\"skipped\",\"id\":\"file:///src/foo/x_test.go?test#TestFoo\"}\n"
        );
    }

    #[test]
    fn tree_output() {
        let items = vec![PresentedItem {
            id: "file:///src/foo/go.mod?module".to_owned(),
            kind: "module".to_owned(),
            label: "foo".to_owned(),
            range: None,
            dynamic: false,
            children: vec![PresentedItem {
                id: format!("{FILE}?test#TestFoo"),
                kind: "test".to_owned(),
                label: "TestFoo".to_owned(),
                range: None,
                dynamic: false,
                children: vec![],
            }],
        }];
        let mut out = Vec::new();
        write_tree(&items, &Styles::default(), &mut out).expect("writing to a Vec succeeds");
        assert_eq!(String::from_utf8(out).expect("UTF-8"), "foo\n    TestFoo\n");
    }

    #[test]
    fn summary_line() {
        let reporter = reporter(MessageFormat::Human, false);
        let report = RunReport {
            run_id: gotest_runner::model::RunId::new_v4(),
            stats: RunStats {
                packages: 1,
                passed: 2,
                ..RunStats::default()
            },
            cancelled: false,
        };
        let mut out = Vec::new();
        reporter
            .write_summary(&report, Duration::from_millis(250), &mut out)
            .expect("writing to a Vec succeeds");
        assert_eq!(
            String::from_utf8(out).expect("UTF-8"),
            "------------\n     Summary [   0.250s] 2 tests run across 1 package: \
             2 passed, 0 failed, 0 skipped, 0 errored\n"
        );
    }
}
