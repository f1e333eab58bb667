// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ItemId;
use std::fmt;

/// The kind of change described by an [`ItemEvent`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ItemEventKind {
    /// The item was created.
    Added,

    /// The item was deleted.
    Removed,

    /// The item's content changed. For test cases, previous results are stale.
    Modified,

    /// The item's location changed but its content did not.
    Moved,
}

impl fmt::Display for ItemEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Moved => "moved",
        };
        f.write_str(s)
    }
}

/// A change to the model produced by reconciliation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ItemEvent {
    /// What happened.
    pub kind: ItemEventKind,

    /// The item it happened to.
    pub id: ItemId,
}

impl ItemEvent {
    /// Creates an `Added` event.
    pub fn added(id: ItemId) -> Self {
        Self {
            kind: ItemEventKind::Added,
            id,
        }
    }

    /// Creates a `Removed` event.
    pub fn removed(id: ItemId) -> Self {
        Self {
            kind: ItemEventKind::Removed,
            id,
        }
    }

    /// Creates a `Modified` event.
    pub fn modified(id: ItemId) -> Self {
        Self {
            kind: ItemEventKind::Modified,
            id,
        }
    }

    /// Creates a `Moved` event.
    pub fn moved(id: ItemId) -> Self {
        Self {
            kind: ItemEventKind::Moved,
            id,
        }
    }
}

impl fmt::Display for ItemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
