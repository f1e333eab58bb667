// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured records exchanged between `gotest-explorer`, the Go test discovery service, and
//! `go test -json`.
//!
//! This crate has no behavior of its own: it defines serializable types so that consumers can read
//! and write the same data.

mod discovery;
mod errors;
mod exit_codes;
mod position;
mod test_event;

pub use discovery::*;
pub use errors::*;
pub use exit_codes::*;
pub use position::*;
pub use test_event::*;
