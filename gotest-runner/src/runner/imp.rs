// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PackageExit, PackageRunState, RunEvent, RunReport, RunStats};
use crate::{
    config::RunnerSettings,
    errors::{DisplayErrorChain, RunTestsError},
    model::{RunId, TestModel},
    run_request::{ResolvedRunRequest, RunPolicy},
    test_command::GoTestCommand,
};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{Semaphore, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs resolved requests.
#[derive(Clone, Debug)]
pub struct TestRunner {
    settings: RunnerSettings,
    test_threads: usize,
    policy: RunPolicy,
}

impl TestRunner {
    /// Creates a runner.
    pub fn new(settings: RunnerSettings, policy: RunPolicy) -> Self {
        let test_threads = settings.test_threads.compute();
        Self {
            settings,
            test_threads,
            policy,
        }
    }

    /// Returns the maximum number of package processes run at once.
    pub fn test_threads(&self) -> usize {
        self.test_threads
    }

    /// Runs `request`, calling `callback` with each event as it happens.
    ///
    /// The model is updated with any dynamic subtests the processes report, owned by the returned
    /// run ID. A request that was cancelled before it started spawns nothing.
    ///
    /// The failure of an individual package is reported through `callback` on the package item
    /// and does not stop other packages.
    pub async fn execute<F>(
        &self,
        model: &mut TestModel,
        request: &ResolvedRunRequest,
        cancel: &CancellationToken,
        mut callback: F,
    ) -> Result<RunReport, RunTestsError>
    where
        F: FnMut(RunEvent),
    {
        let run_id = RunId::new_v4();
        if cancel.is_cancelled() {
            return Ok(RunReport {
                run_id,
                stats: RunStats::default(),
                cancelled: true,
            });
        }

        let plans = request.plans(model, self.policy);
        let mut states: Vec<_> = plans
            .iter()
            .map(|plan| PackageRunState::new(model, plan.package.clone(), run_id))
            .collect();
        debug!(
            %run_id,
            packages = plans.len(),
            test_threads = self.test_threads,
            "starting run",
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(self.test_threads));
        let mut handles = Vec::with_capacity(plans.len());
        for (index, plan) in plans.iter().enumerate() {
            let unit = PackageUnit {
                index,
                command: GoTestCommand::new(&self.settings, plan),
                semaphore: semaphore.clone(),
                cancel: cancel.clone(),
                tx: tx.clone(),
            };
            handles.push((plan.package.clone(), tokio::spawn(unit.run())));
        }
        // The loop below ends once every task has dropped its sender.
        drop(tx);

        let mut stats = RunStats {
            packages: plans.len(),
            ..RunStats::default()
        };
        let mut events = Vec::new();
        while let Some((index, message)) = rx.recv().await {
            let Some(state) = states.get_mut(index) else {
                continue;
            };
            match message {
                UnitMessage::Stdout(line) => state.on_stdout_line(model, &line, &mut events),
                UnitMessage::Stderr(line) => state.on_stderr_line(&line, &mut events),
                UnitMessage::Done(exit) => state.finish(model, exit, &mut events),
            }
            for event in events.drain(..) {
                stats.on_event(&event);
                callback(event);
            }
        }

        for (package, handle) in handles {
            handle
                .await
                .map_err(|err| RunTestsError::TaskPanicked { package, err })?;
        }

        Ok(RunReport {
            run_id,
            stats,
            cancelled: cancel.is_cancelled(),
        })
    }
}

#[derive(Debug)]
enum UnitMessage {
    Stdout(String),
    Stderr(String),
    Done(PackageExit),
}

/// The task running a single package process.
struct PackageUnit {
    index: usize,
    command: GoTestCommand,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<(usize, UnitMessage)>,
}

impl PackageUnit {
    fn send(&self, message: UnitMessage) {
        // The receiver only goes away if the run itself was dropped.
        _ = self.tx.send((self.index, message));
    }

    async fn run(self) {
        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            () = self.cancel.cancelled() => {
                self.send(UnitMessage::Done(PackageExit::Cancelled));
                return;
            }
        };

        let mut spawned = match self.command.spawn() {
            Ok(spawned) => spawned,
            Err(err) => {
                let message = DisplayErrorChain::new(&err).to_string();
                warn!("{message}");
                self.send(UnitMessage::Done(PackageExit::SpawnFailed(message)));
                return;
            }
        };

        let mut stdout = BufReader::new(&mut spawned.stdout).lines();
        let mut stderr = BufReader::new(&mut spawned.stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut cancelled = false;
        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => self.send(UnitMessage::Stdout(line)),
                    Ok(None) | Err(_) => stdout_done = true,
                },
                line = stderr.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => self.send(UnitMessage::Stderr(line)),
                    Ok(None) | Err(_) => stderr_done = true,
                },
                () = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
            }
        }
        drop(stdout);
        drop(stderr);

        let exit = if cancelled {
            spawned.kill_tree();
            _ = spawned.child.wait().await;
            PackageExit::Cancelled
        } else {
            tokio::select! {
                status = spawned.child.wait() => match status {
                    Ok(status) => PackageExit::Exited(status),
                    Err(err) => PackageExit::SpawnFailed(format!("failed to wait for go test: {err}")),
                },
                () = self.cancel.cancelled() => {
                    spawned.kill_tree();
                    _ = spawned.child.wait().await;
                    PackageExit::Cancelled
                }
            }
        };
        self.send(UnitMessage::Done(exit));
    }
}
