// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for gotest-explorer: a model of the Go tests in a set of workspaces, kept in
//! sync with a discovery service, and a runner that streams `go test -json` results back into it.
//!
//! The basic flow is:
//!
//! 1. An [`Explorer`](explorer::Explorer) queries a [`Discovery`](discovery::Discovery) service
//!    and reconciles the results into a [`TestModel`](model::TestModel), publishing what changed.
//! 2. An [`ItemResolver`](presenter::ItemResolver) projects the model into a tree for display.
//! 3. A [`RunSelection`](run_request::RunSelection) is resolved into per-package plans, which the
//!    [`TestRunner`](runner::TestRunner) executes, one `go test` process per package.

pub mod config;
pub mod continuous;
pub mod discovery;
pub mod errors;
pub mod explorer;
mod helpers;
pub mod item_set;
pub mod model;
pub mod presenter;
pub mod relation_map;
pub mod run_request;
pub mod runner;
mod test_command;

pub use helpers::{path_to_uri, uri_to_path};
