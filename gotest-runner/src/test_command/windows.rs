// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tokio::process::Child;
pub(super) use win32job::Job;
use win32job::JobError;
use windows_sys::Win32::System::JobObjects::TerminateJobObject;

pub(super) fn set_process_group(_cmd: &mut std::process::Command) {}

pub(super) fn create_job() -> Result<Job, JobError> {
    Job::create_with_limit_info(win32job::ExtendedLimitInfo::new().limit_breakaway_ok())
}

pub(super) fn assign_process_to_job(child: &Child, job: &Job) -> Result<(), JobError> {
    let Some(handle) = child.raw_handle() else {
        // The child exited already.
        return Ok(());
    };
    job.assign_process(handle as isize)
}

pub(super) fn kill_tree(_child: &Child, job: &Job) {
    unsafe {
        // Errors here mean the processes already exited.
        _ = TerminateJobObject(job.handle() as _, 1);
    }
}
