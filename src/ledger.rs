//! Offset ledger: the highest offset this consumer has observed.
//!
//! The ledger seeds `from_offset` when a session is resumed and reports
//! progress to observers. It only ever moves forward.

use crate::types::Offset;

/// Monotonic high-water mark over observed offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OffsetLedger {
    current: Offset,
}

impl OffsetLedger {
    /// Create a ledger starting at `initial`.
    pub fn new(initial: Offset) -> Self {
        Self { current: initial }
    }

    /// Highest offset observed so far.
    pub fn current(&self) -> Offset {
        self.current
    }

    /// Move to `candidate` if it is ahead of the current offset.
    ///
    /// Returns true if the ledger moved.
    pub fn advance(&mut self, candidate: Offset) -> bool {
        if candidate > self.current {
            self.current = candidate;
            true
        } else {
            false
        }
    }

    /// Advance to the largest of `candidates`.
    pub fn advance_to_max<I>(&mut self, candidates: I) -> bool
    where
        I: IntoIterator<Item = Offset>,
    {
        match candidates.into_iter().max() {
            Some(max) => self.advance(max),
            None => false,
        }
    }
}
