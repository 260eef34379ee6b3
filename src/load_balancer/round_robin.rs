// src/load_balancer/round_robin.rs

/// Round-robin position over a fixed-size pool.
///
/// Not thread-safe on its own; the registry keeps it behind its mutex.
#[derive(Debug)]
pub struct RoundRobinCursor {
    position: usize,
    len: usize,
}

impl RoundRobinCursor {
    /// `len` must be non-zero.
    pub fn new(len: usize) -> Self {
        debug_assert!(len > 0, "round robin over an empty pool");
        Self { position: 0, len }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the first index, starting at the cursor, accepted by
    /// `eligible`, and moves the cursor just past it. When no index is
    /// accepted the current one is returned anyway and the cursor moves
    /// by one.
    pub fn select(&mut self, mut eligible: impl FnMut(usize) -> bool) -> Selection {
        let start = self.position;

        let found = (0..self.len)
            .map(|offset| (start + offset) % self.len)
            .find(|&index| eligible(index));

        let selection = match found {
            Some(index) => Selection {
                index,
                skipped: (index + self.len - start) % self.len,
                eligible: true,
            },
            None => Selection {
                index: start,
                skipped: 0,
                eligible: false,
            },
        };

        self.position = (selection.index + 1) % self.len;
        selection
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    /// Candidates passed over before `index`.
    pub skipped: usize,
    /// False when every candidate was rejected and `index` is a best-effort pick.
    pub eligible: bool,
}
