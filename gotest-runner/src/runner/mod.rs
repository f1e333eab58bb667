// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The streaming test runner.
//!
//! The main structure in this module is [`TestRunner`]. Each package in a resolved request gets its
//! own `go test -json` process; the lines it prints are fed through a [`PackageRunState`], which
//! correlates them with tests in the model and produces [`RunEvent`]s.

mod events;
mod imp;
mod parse;
mod state;

pub use events::*;
pub use imp::*;
pub use state::*;
