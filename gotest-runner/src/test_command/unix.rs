// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{convert::Infallible, os::unix::process::CommandExt};
use tokio::process::Child;

/// Process groups stand in for job objects on Unix.
#[derive(Debug)]
pub(super) struct Job(());

pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

pub(super) fn create_job() -> Result<Job, Infallible> {
    Ok(Job(()))
}

pub(super) fn assign_process_to_job(_child: &Child, _job: &Job) -> Result<(), Infallible> {
    Ok(())
}

pub(super) fn kill_tree(child: &Child, _job: &Job) {
    let Some(pid) = child.id() else {
        // The child exited already.
        return;
    };
    // The child leads its own process group, so a negative pid signals all of it.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}
