// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawning `go test -json` for a package.

use crate::{config::RunnerSettings, errors::SpawnError, run_request::PackagePlan};
use camino::Utf8PathBuf;
use std::{io, process::Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::debug;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[path = "unix.rs"]
        mod unix;
        use unix as os;
    } else if #[cfg(windows)] {
        #[path = "windows.rs"]
        mod windows;
        use windows as os;
    } else {
        compile_error!("unsupported target platform");
    }
}

/// A to-be-run `go test` invocation for a single package.
#[derive(Clone, Debug)]
pub(crate) struct GoTestCommand {
    program: String,
    args: Vec<String>,
    dir: Utf8PathBuf,
}

impl GoTestCommand {
    pub(crate) fn new(settings: &RunnerSettings, plan: &PackagePlan) -> Self {
        let mut args = vec!["test".to_owned(), "-json".to_owned()];
        args.extend(settings.build_flags.iter().cloned());
        args.extend(plan.filters.to_args());
        args.push(".".to_owned());
        Self {
            program: settings.go_binary.clone(),
            args,
            dir: plan.dir.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn args(&self) -> &[String] {
        &self.args
    }

    /// Spawns the command in its own process group (or job object), so the whole tree can be
    /// killed on cancellation.
    pub(crate) fn spawn(&self) -> Result<SpawnedTest, SpawnError> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        os::set_process_group(&mut cmd);

        debug!(program = %self.program, args = ?self.args, dir = %self.dir, "spawning test process");
        let mut cmd: tokio::process::Command = cmd.into();
        cmd.kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|err| self.spawn_error(err))?;

        let job = os::create_job().map_err(|err| self.spawn_error(io::Error::other(err)))?;
        os::assign_process_to_job(&child, &job).map_err(|err| self.spawn_error(io::Error::other(err)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => Ok(SpawnedTest {
                child,
                stdout,
                stderr,
                job,
            }),
            _ => Err(self.spawn_error(io::Error::other("output was not captured"))),
        }
    }

    fn spawn_error(&self, err: io::Error) -> SpawnError {
        SpawnError::new(self.program.clone(), self.dir.clone(), err)
    }
}

/// A running test process.
pub(crate) struct SpawnedTest {
    pub(crate) child: Child,
    pub(crate) stdout: ChildStdout,
    pub(crate) stderr: ChildStderr,
    job: os::Job,
}

impl SpawnedTest {
    /// Kills the process and everything it spawned.
    pub(crate) fn kill_tree(&mut self) {
        os::kill_tree(&self.child, &self.job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::ItemId, run_request::RunFilters};
    use pretty_assertions::assert_eq;

    #[test]
    fn command_line() {
        let settings = RunnerSettings {
            go_binary: "go".to_owned(),
            build_flags: vec!["-race".to_owned()],
            ..RunnerSettings::default()
        };
        let plan = PackagePlan {
            package: ItemId::package("file:///src/foo"),
            import_path: "foo".to_owned(),
            dir: "/src/foo".into(),
            filters: RunFilters {
                run: Some("^TestFoo$".to_owned()),
                skip: None,
                bench: None,
            },
        };
        let command = GoTestCommand::new(&settings, &plan);
        assert_eq!(
            command.args(),
            ["test", "-json", "-race", "-run", "^TestFoo$", "."]
        );
    }
}
