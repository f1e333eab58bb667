// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The state machine that turns a package's `go test -json` stream into [`RunEvent`]s.

use super::{
    RunEvent, TestMessage,
    parse::{
        example_diff, is_banner, is_benchmark_result, is_build_failure, located_messages,
        parse_located_line, plain_message,
    },
};
use crate::{
    helpers::{display_exited_with, path_to_uri, uri_to_path},
    model::{ItemId, ItemKind, ModelItem, RunId, TestKind, TestModel},
};
use camino::{Utf8Path, Utf8PathBuf};
use gotest_metadata::{GoTestAction, GoTestEvent, Location};
use indexmap::IndexSet;
use smol_str::SmolStr;
use std::{collections::HashMap, process::ExitStatus};
use tracing::{debug, warn};

/// How a package process ended.
#[derive(Debug)]
pub enum PackageExit {
    /// The process exited.
    Exited(ExitStatus),

    /// The process could not be started.
    SpawnFailed(String),

    /// The run was cancelled and the process tree was killed.
    Cancelled,
}

/// Correlation state for a single package process.
///
/// Lines are pushed in as they arrive. Every method takes the model so that subtests reported by
/// the process can be created as dynamic tests owned by this run.
#[derive(Debug)]
pub struct PackageRunState {
    package: ItemId,
    dir: Option<Utf8PathBuf>,
    run_id: RunId,
    // Resolved IDs by test name. `None` means the name could not be mapped to a test.
    ids: HashMap<SmolStr, Option<ItemId>>,
    current_location: HashMap<ItemId, Location>,
    output: HashMap<ItemId, Vec<String>>,
    package_output: Vec<String>,
    build_output: Vec<String>,
    running: IndexSet<ItemId>,
    build_failed: bool,
    finished: bool,
}

impl PackageRunState {
    /// Creates the state for running `package`, which must be a package item in the model.
    pub fn new(model: &TestModel, package: ItemId, run_id: RunId) -> Self {
        let dir = model
            .package(&package)
            .and_then(|p| uri_to_path(p.package.dir_uri()));
        Self {
            package,
            dir,
            run_id,
            ids: HashMap::new(),
            current_location: HashMap::new(),
            output: HashMap::new(),
            package_output: Vec::new(),
            build_output: Vec::new(),
            running: IndexSet::new(),
            build_failed: false,
            finished: false,
        }
    }

    /// Returns the package item.
    pub fn package(&self) -> &ItemId {
        &self.package
    }

    /// Handles a line of standard output.
    pub fn on_stdout_line(&mut self, model: &mut TestModel, line: &str, events: &mut Vec<RunEvent>) {
        match GoTestEvent::parse_line(line) {
            Ok(event) => self.on_event(model, event, events),
            Err(_) => {
                // Not JSON: the toolchain printed something directly.
                let line = with_newline(line);
                if is_build_failure(&line) {
                    self.build_failed = true;
                }
                self.package_output.push(line.clone());
                events.push(self.package_output_event(line));
            }
        }
    }

    /// Handles a line of standard error.
    pub fn on_stderr_line(&mut self, line: &str, events: &mut Vec<RunEvent>) {
        let line = with_newline(line);
        self.build_output.push(line.clone());
        events.push(self.package_output_event(line));
    }

    /// Handles a single event from the stream.
    pub fn on_event(&mut self, model: &mut TestModel, event: GoTestEvent, events: &mut Vec<RunEvent>) {
        let test = match &event.test {
            Some(name) => self.resolve_test(model, name, events),
            None => None,
        };
        let elapsed_ms = event
            .elapsed_duration()
            .map(|duration| duration.as_millis() as u64);

        match event.action {
            GoTestAction::Run | GoTestAction::Start => match test {
                Some(id) => {
                    self.start_test(model, &id, events);
                    events.push(RunEvent::Started { id });
                }
                None if event.test.is_none() => events.push(RunEvent::Started {
                    id: self.package.clone(),
                }),
                None => {}
            },
            GoTestAction::Output => {
                let line = event.output.unwrap_or_default();
                self.on_output(test, line, events);
            }
            GoTestAction::BuildOutput => {
                let line = event.output.unwrap_or_default();
                self.build_output.push(line.clone());
                events.push(self.package_output_event(line));
            }
            GoTestAction::BuildFail => {
                self.build_failed = true;
            }
            GoTestAction::Pass | GoTestAction::Bench => match test {
                Some(id) => self.pass(id, elapsed_ms, events),
                None if event.test.is_none() => {
                    self.finished = true;
                    events.push(RunEvent::Passed {
                        id: self.package.clone(),
                        elapsed_ms,
                    });
                }
                None => {}
            },
            GoTestAction::Skip => match test {
                Some(id) => {
                    self.running.shift_remove(&id);
                    events.push(RunEvent::Skipped { id });
                }
                None if event.test.is_none() => {
                    self.finished = true;
                    events.push(RunEvent::Skipped {
                        id: self.package.clone(),
                    });
                }
                None => {}
            },
            GoTestAction::Fail => match test {
                Some(id) => self.fail_test(model, id, elapsed_ms, events),
                None if event.test.is_none() => self.fail_package(model, elapsed_ms, events),
                None => {}
            },
            GoTestAction::Pause | GoTestAction::Cont | GoTestAction::Unknown => {}
        }
    }

    /// Handles the end of the process.
    ///
    /// Tests still running are errored, unless the run was cancelled: those are skipped.
    pub fn finish(&mut self, model: &TestModel, exit: PackageExit, events: &mut Vec<RunEvent>) {
        let cancelled = matches!(exit, PackageExit::Cancelled);
        for id in std::mem::take(&mut self.running) {
            if cancelled {
                events.push(RunEvent::Skipped { id });
            } else {
                events.push(RunEvent::Errored {
                    id,
                    messages: vec![TestMessage::new("test did not complete", None)],
                });
            }
        }

        match exit {
            PackageExit::Exited(status) => {
                if self.build_failed && !self.finished {
                    // Some toolchains exit without a package-level fail event.
                    self.report_build_failure(model, events);
                }
                // 0 and 1 mean the tests ran, whatever their outcome.
                if !matches!(status.code(), Some(0 | 1)) {
                    events.push(RunEvent::Errored {
                        id: self.package.clone(),
                        messages: vec![TestMessage::new(
                            format!("go test {}", display_exited_with(status)),
                            None,
                        )],
                    });
                }
            }
            PackageExit::SpawnFailed(message) => {
                events.push(RunEvent::Errored {
                    id: self.package.clone(),
                    messages: vec![TestMessage::new(message, None)],
                });
            }
            PackageExit::Cancelled => {
                debug!(package = %self.package, "package run cancelled");
            }
        }
    }

    fn on_output(&mut self, test: Option<ItemId>, line: String, events: &mut Vec<RunEvent>) {
        if is_build_failure(&line) {
            self.build_failed = true;
        }
        let Some(id) = test else {
            self.package_output.push(line.clone());
            events.push(self.package_output_event(line));
            return;
        };

        if is_banner(&line) {
            self.output.entry(id).or_default().push(line.clone());
            events.push(self.package_output_event(line));
            return;
        }

        let location = match parse_located_line(&line)
            .and_then(|located| Some(located.to_location(self.resolve_file(located.file)?)))
        {
            Some(location) => {
                self.current_location.insert(id.clone(), location.clone());
                Some(location)
            }
            None => self.current_location.get(&id).cloned(),
        };

        let benchmark_done = is_benchmark_result(&line);
        self.output.entry(id.clone()).or_default().push(line.clone());
        events.push(RunEvent::Output {
            id: id.clone(),
            line,
            location,
        });
        if benchmark_done && is_benchmark(&id) && self.running.contains(&id) {
            self.pass(id, None, events);
        }
    }

    fn start_test(&mut self, model: &mut TestModel, id: &ItemId, events: &mut Vec<RunEvent>) {
        // Subtests left over from earlier runs may not be reported again.
        let owned_by_this_run = match model.find(id) {
            Some(ModelItem::Test(t)) => t.test.run_id() == Some(self.run_id),
            _ => false,
        };
        if !owned_by_this_run {
            let removed = model.remove_dynamic_test_cases(id);
            if !removed.is_empty() {
                self.ids.retain(|_, resolved| {
                    resolved
                        .as_ref()
                        .is_none_or(|resolved| !removed.iter().any(|e| &e.id == resolved))
                });
                events.push(RunEvent::ItemsChanged { events: removed });
            }
        }
        self.running.insert(id.clone());
    }

    fn pass(&mut self, id: ItemId, elapsed_ms: Option<u64>, events: &mut Vec<RunEvent>) {
        // A benchmark may already have been passed by its result line.
        if !self.running.shift_remove(&id) && is_benchmark(&id) {
            return;
        }
        events.push(RunEvent::Passed { id, elapsed_ms });
    }

    fn fail_test(
        &mut self,
        model: &TestModel,
        id: ItemId,
        elapsed_ms: Option<u64>,
        events: &mut Vec<RunEvent>,
    ) {
        self.running.shift_remove(&id);
        let output = self.output.get(&id).map_or(&[][..], Vec::as_slice);

        let diff = match id.kind() {
            ItemKind::Test(TestKind::Example) => example_diff(output),
            _ => None,
        };
        let messages = match diff {
            Some(diff) => vec![diff],
            None => {
                let messages = located_messages(output, |file| self.resolve_file(file));
                if messages.is_empty() {
                    let location = test_location(model, &id);
                    plain_message(output)
                        .map(|message| TestMessage { location, ..message })
                        .into_iter()
                        .collect()
                } else {
                    messages
                }
            }
        };
        events.push(RunEvent::Failed {
            id,
            messages,
            elapsed_ms,
        });
    }

    fn fail_package(&mut self, model: &TestModel, elapsed_ms: Option<u64>, events: &mut Vec<RunEvent>) {
        self.finished = true;
        if self.build_failed || self.package_output.iter().any(|line| is_build_failure(line)) {
            self.build_failed = true;
            self.report_build_failure(model, events);
        } else {
            events.push(RunEvent::Failed {
                id: self.package.clone(),
                messages: Vec::new(),
                elapsed_ms,
            });
        }
    }

    /// Attributes build errors to the tests whose declared range contains them.
    fn report_build_failure(&self, model: &TestModel, events: &mut Vec<RunEvent>) {
        let messages = located_messages(&self.build_output, |file| self.resolve_file(file));
        let mut per_test: Vec<(ItemId, Vec<TestMessage>)> = Vec::new();
        let mut unattributed = Vec::new();

        for message in messages {
            match message
                .location
                .as_ref()
                .and_then(|location| self.test_containing(model, location))
            {
                Some(id) => match per_test.iter_mut().find(|(test, _)| *test == id) {
                    Some((_, messages)) => messages.push(message),
                    None => per_test.push((id, vec![message])),
                },
                None => unattributed.push(message),
            }
        }

        if per_test.is_empty() && unattributed.is_empty() {
            let message = plain_message(&self.build_output)
                .unwrap_or_else(|| TestMessage::new("build failed", None));
            unattributed.push(message);
        }

        for (id, messages) in per_test {
            events.push(RunEvent::Errored { id, messages });
        }
        if !unattributed.is_empty() {
            events.push(RunEvent::Errored {
                id: self.package.clone(),
                messages: unattributed,
            });
        }
    }

    /// The first static test whose declared range contains `location`.
    fn test_containing(&self, model: &TestModel, location: &Location) -> Option<ItemId> {
        let package = model.package(&self.package)?;
        let file = package.package.files().get(&location.uri)?;
        file.tests()
            .iter()
            .find(|test| {
                test.range()
                    .is_some_and(|range| range.contains_position(location.range.start))
            })
            .map(|test| test.id())
    }

    fn resolve_test(
        &mut self,
        model: &mut TestModel,
        name: &SmolStr,
        events: &mut Vec<RunEvent>,
    ) -> Option<ItemId> {
        if let Some(resolved) = self.ids.get(name) {
            return resolved.clone();
        }

        let existing = model
            .package(&self.package)
            .and_then(|p| p.package.test(name).map(|test| test.id()));
        let resolved = match existing {
            Some(id) => Some(id),
            None => {
                let (id, created) = model.make_dynamic_test_case(&self.package, name, self.run_id);
                if !created.is_empty() {
                    events.push(RunEvent::ItemsChanged { events: created });
                }
                if id.is_none() {
                    warn!(
                        package = %self.package,
                        test = %name,
                        "output attributed to package: test is unknown or the subtest limit was reached",
                    );
                }
                id
            }
        };
        self.ids.insert(name.clone(), resolved.clone());
        resolved
    }

    fn resolve_file(&self, file: &str) -> Option<String> {
        let file = file.strip_prefix("./").unwrap_or(file);
        let path = Utf8Path::new(file);
        if path.is_absolute() {
            return path_to_uri(path);
        }
        path_to_uri(&self.dir.as_ref()?.join(path))
    }

    fn package_output_event(&self, line: String) -> RunEvent {
        RunEvent::Output {
            id: self.package.clone(),
            line,
            location: None,
        }
    }
}

fn with_newline(line: &str) -> String {
    let mut line = line.trim_end_matches(['\r', '\n']).to_owned();
    line.push('\n');
    line
}

fn is_benchmark(id: &ItemId) -> bool {
    id.kind() == ItemKind::Test(TestKind::Benchmark)
}

fn test_location(model: &TestModel, id: &ItemId) -> Option<Location> {
    match model.find(id)? {
        ModelItem::Test(t) => t.test.range().map(|range| Location {
            uri: t.test.file_uri().to_owned(),
            range,
        }),
        _ => None,
    }
}
