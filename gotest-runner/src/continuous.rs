// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rerunning tests as their files are saved.

use crate::{
    model::{ItemId, TestModel},
    run_request::{ResolvedRunRequest, RunPolicy},
};
use indexmap::IndexSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Collects saved items between reruns of a request.
///
/// Each save adds the invalidated test and file items to a pending set. [`take_pending`] drains
/// that set into a narrowed version of the governing request. Once `cancel` fires the queue stops
/// accepting items and drops whatever was pending.
///
/// [`take_pending`]: Self::take_pending
#[derive(Debug)]
pub struct ContinuousRunQueue {
    request: ResolvedRunRequest,
    pending: IndexSet<ItemId>,
    cancel: CancellationToken,
}

impl ContinuousRunQueue {
    /// Creates a queue that reruns parts of `request` until `cancel` fires.
    pub fn new(request: ResolvedRunRequest, cancel: CancellationToken) -> Self {
        Self {
            request,
            pending: IndexSet::new(),
            cancel,
        }
    }

    /// Returns the governing request.
    pub fn request(&self) -> &ResolvedRunRequest {
        &self.request
    }

    /// Returns true once the queue has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Records items invalidated by a save. Returns false if the queue has been cancelled.
    pub fn on_saved(&mut self, items: impl IntoIterator<Item = ItemId>) -> bool {
        if self.is_cancelled() {
            self.pending.clear();
            return false;
        }
        self.pending.extend(items);
        true
    }

    /// Returns true if saves are waiting to be rerun.
    pub fn has_pending(&self) -> bool {
        !self.is_cancelled() && !self.pending.is_empty()
    }

    /// Drains the pending items into a request that runs only the affected tests.
    ///
    /// Returns `None` if the queue was cancelled or if none of the pending items are covered by
    /// the governing request.
    pub fn take_pending(
        &mut self,
        model: &TestModel,
        policy: RunPolicy,
    ) -> Option<ResolvedRunRequest> {
        let pending: Vec<ItemId> = self.pending.drain(..).collect();
        if self.is_cancelled() || pending.is_empty() {
            return None;
        }

        let narrowed = self.request.narrow(model, &pending, policy);
        debug!(
            pending = pending.len(),
            packages = narrowed.packages().len(),
            "narrowed continuous run",
        );
        (!narrowed.is_empty()).then_some(narrowed)
    }
}
