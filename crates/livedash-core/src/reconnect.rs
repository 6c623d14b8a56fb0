//! Reconnect policy for the push channel.
//!
//! Pure state machine with no IO or async dependencies. The delay is fixed,
//! never exponential. An attempt cap is optional and unset by default, in
//! which case reconnects continue indefinitely at the fixed interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay between an unexpected closure and the reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Fixed delay before each reconnect attempt.
    pub delay: Duration,
    /// Consecutive failed attempts allowed before giving up. `None` = unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }
}

/// Decision returned after an unexpected closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule exactly one reconnect attempt after `after`.
    Retry { after: Duration },
    /// Attempt cap exhausted; the connection is abandoned.
    GiveUp,
}

/// Tracks consecutive closures for one connection.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    consecutive_closures: u32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            consecutive_closures: 0,
        }
    }

    /// Record an unexpected closure (or a failed connect) and decide what to do.
    pub fn record_closure(&mut self) -> ReconnectDecision {
        self.consecutive_closures = self.consecutive_closures.saturating_add(1);
        match self.policy.max_attempts {
            Some(max) if self.consecutive_closures > max => ReconnectDecision::GiveUp,
            _ => ReconnectDecision::Retry {
                after: self.policy.delay,
            },
        }
    }

    /// Record a successful open. Resets the closure count.
    pub fn record_open(&mut self) {
        self.consecutive_closures = 0;
    }

    pub fn consecutive_closures(&self) -> u32 {
        self.consecutive_closures
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_fixed_five_seconds_unbounded() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay, Duration::from_secs(5));
        assert_eq!(p.max_attempts, None);
    }

    #[test]
    fn delay_does_not_grow() {
        let mut t = ReconnectTracker::new(ReconnectPolicy::default());
        for _ in 0..50 {
            assert_eq!(
                t.record_closure(),
                ReconnectDecision::Retry {
                    after: Duration::from_secs(5)
                }
            );
        }
        assert_eq!(t.consecutive_closures(), 50);
    }

    #[test]
    fn cap_gives_up_after_max_attempts() {
        let mut t = ReconnectTracker::new(ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(2),
        });
        assert!(matches!(t.record_closure(), ReconnectDecision::Retry { .. }));
        assert!(matches!(t.record_closure(), ReconnectDecision::Retry { .. }));
        assert_eq!(t.record_closure(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn open_resets_the_count() {
        let mut t = ReconnectTracker::new(ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(1),
        });
        assert!(matches!(t.record_closure(), ReconnectDecision::Retry { .. }));
        t.record_open();
        assert_eq!(t.consecutive_closures(), 0);
        assert!(matches!(t.record_closure(), ReconnectDecision::Retry { .. }));
    }

    #[test]
    fn zero_cap_never_retries() {
        let mut t = ReconnectTracker::new(ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(0),
        });
        assert_eq!(t.record_closure(), ReconnectDecision::GiveUp);
    }
}
