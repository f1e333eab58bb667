// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// A zero-based position within a text document.
///
/// Positions are ordered by line first, then by character.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Position {
    /// The zero-based line number.
    pub line: u32,

    /// The zero-based character offset within the line.
    pub character: u32,
}

impl Position {
    /// Creates a new position.
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.character + 1)
    }
}

/// A half-open range within a text document.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Range {
    /// The start of the range.
    pub start: Position,

    /// The end of the range.
    pub end: Position,
}

impl Range {
    /// Creates a new range.
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Creates a range that spans whole lines, from the start of `start_line` to the start of
    /// `end_line`.
    pub const fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line, 0),
        }
    }

    /// Creates a zero-width range at the given position.
    pub const fn point(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    /// Returns true if this range has zero width.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if `position` lies within this range, boundaries included.
    pub fn contains_position(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// Returns true if the lines spanned by this range include `line`.
    pub fn contains_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

/// A range within a specific document.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Location {
    /// The document URI.
    pub uri: String,

    /// The range within the document.
    pub range: Range,
}
