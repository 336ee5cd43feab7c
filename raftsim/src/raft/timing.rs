//! RAFT timing constants.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Election and heartbeat timing, in simulated seconds.
///
/// # Invariants
///
/// - `0 < election_timeout_min <= election_timeout_max`
/// - `0 < heartbeat_interval < election_timeout_min`
///
/// These are checked by [`SimulationConfig::validate`](crate::config::SimulationConfig::validate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaftTiming {
    pub election_timeout_min: f64,
    pub election_timeout_max: f64,
    pub heartbeat_interval: f64,
}

impl RaftTiming {
    pub const DEFAULT_ELECTION_TIMEOUT_MIN: f64 = 1.0;
    pub const DEFAULT_ELECTION_TIMEOUT_MAX: f64 = 2.0;
    pub const DEFAULT_HEARTBEAT_INTERVAL: f64 = 0.5;

    /// Draw a fresh election timeout uniformly from the configured range.
    pub fn draw_election_timeout(&self, rng: &mut StdRng) -> f64 {
        if self.election_timeout_max <= self.election_timeout_min {
            return self.election_timeout_min;
        }
        rng.random_range(self.election_timeout_min..=self.election_timeout_max)
    }
}

impl Default for RaftTiming {
    fn default() -> Self {
        Self {
            election_timeout_min: Self::DEFAULT_ELECTION_TIMEOUT_MIN,
            election_timeout_max: Self::DEFAULT_ELECTION_TIMEOUT_MAX,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_election_timeout_within_range() {
        let timing = RaftTiming::default();
        let mut rng = StdRng::seed_from_u64(5);
        let draws: Vec<f64> = (0..200)
            .map(|_| timing.draw_election_timeout(&mut rng))
            .collect();

        assert!(draws.iter().all(|t| (1.0..=2.0).contains(t)));
        // Randomized, not constant.
        assert!(draws.iter().any(|t| (t - draws[0]).abs() > 1e-6));
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let timing = RaftTiming {
            election_timeout_min: 1.5,
            election_timeout_max: 1.5,
            heartbeat_interval: 0.5,
        };
        let mut rng = StdRng::seed_from_u64(5);
        assert!((timing.draw_election_timeout(&mut rng) - 1.5).abs() < f64::EPSILON);
    }
}
