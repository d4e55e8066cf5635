use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for a piece of weave content (knot, stitch, gather,
/// choice or sequence).
///
/// Assigned once by the compiler and independent of names and positions, so
/// visit counts keyed by it survive renaming of unrelated sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uuid(pub u32);

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh [`Uuid`]s in increasing order.
///
/// Owned by a compile context and passed by reference; there is no global
/// counter.
#[derive(Debug, Clone, Default)]
pub struct UuidGenerator {
    next: u32,
}

impl UuidGenerator {
    /// Create a generator whose first id is `#0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator that continues after `last`.
    pub fn after(last: Uuid) -> Self {
        Self {
            next: last.0.saturating_add(1),
        }
    }

    /// Return the next unused id.
    pub fn next_id(&mut self) -> Uuid {
        let id = Uuid(self.next);
        self.next += 1;
        id
    }
}
