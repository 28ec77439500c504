//! Active-context clock.
//!
//! Calculated subjects cache their active contexts per tick. Advancing the
//! clock (by hand or with [`PermissionsEngine::spawn_ticker`]) makes the
//! next access recompute them.
//!
//! [`PermissionsEngine::spawn_ticker`]: crate::PermissionsEngine::spawn_ticker

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic tick counter.
#[derive(Debug, Default)]
pub struct ContextClock {
    tick: AtomicU64,
}

impl ContextClock {
    /// Creates a clock at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Advances one tick and returns the new value.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotonic() {
        let clock = ContextClock::new();
        assert_eq!(clock.current(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.current(), 2);
    }
}
