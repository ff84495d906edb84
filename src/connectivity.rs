//! Connectivity state shared by the dispatcher and the health loop
//!
//! Two flags, both false at boot. Writers: network bring-up
//! (`network_reachable`) and the message dispatcher (both flags). The health
//! loop only reads. Flags are atomics with Release stores and Acquire loads;
//! a reader may still see a value one health period old, which only delays
//! the LED feedback.

use core::sync::atomic::{AtomicBool, Ordering};

/// Point-in-time copy of the connectivity flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connectivity {
    pub network_reachable: bool,
    pub broker_reachable: bool,
}

impl Connectivity {
    /// True when either the network or the broker is unreachable
    pub fn is_degraded(&self) -> bool {
        !self.network_reachable || !self.broker_reachable
    }
}

/// Process-wide connectivity record, rebuilt from scratch on every boot
#[derive(Debug, Default)]
pub struct ConnectivityState {
    network_reachable: AtomicBool,
    broker_reachable: AtomicBool,
}

impl ConnectivityState {
    /// Create a new state with both links down
    pub const fn new() -> Self {
        Self {
            network_reachable: AtomicBool::new(false),
            broker_reachable: AtomicBool::new(false),
        }
    }

    pub fn network_reachable(&self) -> bool {
        self.network_reachable.load(Ordering::Acquire)
    }

    pub fn set_network_reachable(&self, reachable: bool) {
        self.network_reachable.store(reachable, Ordering::Release);
    }

    pub fn broker_reachable(&self) -> bool {
        self.broker_reachable.load(Ordering::Acquire)
    }

    pub fn set_broker_reachable(&self, reachable: bool) {
        self.broker_reachable.store(reachable, Ordering::Release);
    }

    /// Read both flags
    pub fn snapshot(&self) -> Connectivity {
        Connectivity {
            network_reachable: self.network_reachable(),
            broker_reachable: self.broker_reachable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_both_links_down() {
        let state = ConnectivityState::new();
        assert_eq!(state.snapshot(), Connectivity::default());
        assert!(state.snapshot().is_degraded());
    }

    #[test]
    fn degraded_unless_both_links_up() {
        let state = ConnectivityState::new();

        state.set_network_reachable(true);
        assert!(state.snapshot().is_degraded());

        state.set_broker_reachable(true);
        assert!(!state.snapshot().is_degraded());

        state.set_network_reachable(false);
        assert!(state.snapshot().is_degraded());
    }

    #[test]
    fn flags_are_independent() {
        let state = ConnectivityState::new();
        state.set_broker_reachable(true);
        assert!(state.broker_reachable());
        assert!(!state.network_reachable());
    }
}
