// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that drive the explorer against in-memory discovery snapshots.

#[cfg(unix)]
mod explorer;
#[cfg(unix)]
mod fixtures;
#[cfg(unix)]
mod runner;
