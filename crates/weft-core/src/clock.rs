//! Community global time.

use crate::identifiers::GlobalTime;

/// Lamport-style clock for one community.
///
/// Local messages claim `current + 1`; received messages pull the clock forward. Messages that
/// claim a time further ahead than `margin` are not acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalClock {
    current: GlobalTime,
    margin: u64,
}

impl GlobalClock {
    pub fn new(margin: u64) -> Self {
        Self { current: 0, margin }
    }

    pub fn current(&self) -> GlobalTime {
        self.current
    }

    /// Global time for a message authored locally.
    pub fn claim(&mut self) -> GlobalTime {
        self.current = self.current.saturating_add(1);
        self.current
    }

    /// Account for a message received from a peer.
    pub fn observe(&mut self, global_time: GlobalTime) {
        if global_time > self.current {
            self.current = global_time;
        }
    }

    /// Highest global time an incoming message may carry.
    pub fn acceptable_bound(&self) -> GlobalTime {
        self.current.saturating_add(self.margin)
    }

    pub fn is_acceptable(&self, global_time: GlobalTime) -> bool {
        global_time <= self.acceptable_bound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_observe() {
        let mut clock = GlobalClock::new(100);
        assert_eq!(clock.claim(), 1);
        clock.observe(50);
        assert_eq!(clock.claim(), 51);
        clock.observe(10);
        assert_eq!(clock.current(), 51);
    }

    #[test]
    fn test_acceptable_bound() {
        let mut clock = GlobalClock::new(100);
        clock.observe(1_000);
        assert!(clock.is_acceptable(1_100));
        assert!(!clock.is_acceptable(1_101));
    }
}
