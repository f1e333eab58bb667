// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A command-line explorer for Go tests.
//!
//! `gotest-explorer list` prints the tests found by a discovery service as a tree, and
//! `gotest-explorer run` runs a selection of them through `go test -json`, streaming results as
//! they arrive.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod reporter;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
