//! Read-result carriers.
//!
//! A [`Cell`] is one `(family, qualifier, timestamp, value)` tuple; a
//! [`RowResult`] is the ordered list of cells a read produced. The replica
//! layer returns cells newest-first and the latest-get merge relies on
//! that ordering.

use serde::{Deserialize, Serialize};

/// One versioned cell of a row.
///
/// Timestamps are microseconds since epoch, signed; larger means newer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub family: String,
    pub qualifier: String,
    pub timestamp: i64,
    pub value: Vec<u8>,
}

impl Cell {
    pub fn new(
        family: impl Into<String>,
        qualifier: impl Into<String>,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            value: value.into(),
        }
    }
}

/// The result buffer of a row read: cells ordered newest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowResult {
    pub cells: Vec<Cell>,
}

impl RowResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Value of the newest cell, if any.
    pub fn latest_value(&self) -> Option<&[u8]> {
        self.cells.first().map(|c| c.value.as_slice())
    }
}

impl FromIterator<Cell> for RowResult {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}
