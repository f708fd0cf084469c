use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared cursor over the linear index space `[0, size)`.
///
/// The only coordination point between workers: each call to [`WorkCursor::take`]
/// reserves a disjoint run of consecutive indices.
#[derive(Debug)]
pub struct WorkCursor {
    next: AtomicU64,
    size: u64,
}

impl WorkCursor {
    pub fn new(size: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            size,
        }
    }

    /// Reserve up to `n` indices. Returns an empty range once the space is exhausted.
    pub fn take(&self, n: u64) -> Range<u64> {
        if n == 0 || self.next.load(Ordering::Relaxed) >= self.size {
            return self.size..self.size;
        }
        let lo = self.next.fetch_add(n, Ordering::Relaxed);
        if lo >= self.size {
            return self.size..self.size;
        }
        lo..lo.saturating_add(n).min(self.size)
    }

    /// Indices not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.size
            .saturating_sub(self.next.load(Ordering::Relaxed).min(self.size))
    }
}
