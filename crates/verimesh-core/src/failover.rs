//! The one-shot entry-point router.
//!
//! A run has two binder entry points per logical region pair. The router
//! starts on the primary and switches to the secondary exactly once, when
//! the outbound sequence counter reaches the configured switch point. It
//! never switches back, even if lower sequence numbers arrive afterwards:
//! the routing state is monotonic. Nothing downstream observes or depends
//! on which entry point a request took.

use serde::{Deserialize, Serialize};

/// Which of the two configured entry points a request should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// The region-1 binder.
    Primary,
    /// The region-2 binder.
    Secondary,
}

/// Routing state; transitions at most once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPhase {
    /// Traffic goes to the primary entry point.
    ActivePrimary,
    /// The one-time switch happened; traffic goes to the secondary.
    ActiveSecondary,
}

/// Deterministic, index-based failover router.
#[derive(Debug, Clone)]
pub struct FailoverRouter {
    switch_at: u64,
    phase: RoutingPhase,
}

impl FailoverRouter {
    /// Creates a router that switches when the sequence reaches
    /// `switch_at`.
    #[must_use]
    pub const fn new(switch_at: u64) -> Self {
        Self {
            switch_at,
            phase: RoutingPhase::ActivePrimary,
        }
    }

    /// Routes one sequence number, advancing the state machine if the
    /// switch point has been reached.
    pub fn route(&mut self, sequence: u64) -> EntryPoint {
        if self.phase == RoutingPhase::ActivePrimary && sequence >= self.switch_at {
            self.phase = RoutingPhase::ActiveSecondary;
        }
        match self.phase {
            RoutingPhase::ActivePrimary => EntryPoint::Primary,
            RoutingPhase::ActiveSecondary => EntryPoint::Secondary,
        }
    }

    /// The current routing phase.
    #[must_use]
    pub const fn phase(&self) -> RoutingPhase {
        self.phase
    }

    /// The configured switch point.
    #[must_use]
    pub const fn switch_at(&self) -> u64 {
        self.switch_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_the_sequence_at_the_switch_point() {
        let mut router = FailoverRouter::new(375);
        for seq in 0..375 {
            assert_eq!(router.route(seq), EntryPoint::Primary, "sequence {seq}");
        }
        for seq in 375..750 {
            assert_eq!(router.route(seq), EntryPoint::Secondary, "sequence {seq}");
        }
    }

    #[test]
    fn switch_is_never_rolled_back() {
        let mut router = FailoverRouter::new(10);
        assert_eq!(router.route(10), EntryPoint::Secondary);
        // A late, out-of-order low sequence still routes to the secondary.
        assert_eq!(router.route(3), EntryPoint::Secondary);
        assert_eq!(router.phase(), RoutingPhase::ActiveSecondary);
    }

    #[test]
    fn switch_at_zero_starts_on_secondary() {
        let mut router = FailoverRouter::new(0);
        assert_eq!(router.route(0), EntryPoint::Secondary);
    }

    #[test]
    fn phase_starts_primary() {
        let router = FailoverRouter::new(100);
        assert_eq!(router.phase(), RoutingPhase::ActivePrimary);
    }
}
