//! Region records of the arena ledger.

use derive_more::{Display, IsVariant};

/// Whether a region currently backs a live allocation.
#[derive(Clone, Copy, Debug, Display, IsVariant, PartialEq, Eq)]
pub enum RegionState {
    /// Available for allocation.
    Free,
    /// Backing a live allocation.
    Occupied,
}

/// One contiguous sub-range of the arena.
///
/// Regions tile the arena completely: record `i + 1` always starts where
/// record `i` ends, the first record starts at offset 0, and the last one
/// ends at the arena capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// Start of the region, in bytes from the arena base.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
    /// Free or occupied.
    pub state: RegionState,
}

impl Region {
    /// Offset one past the last byte of the region.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }
}
