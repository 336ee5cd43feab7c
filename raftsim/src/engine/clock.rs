//! Virtual clock for the simulation.
//!
//! Time only moves when the engine processes the next queued event. There is
//! no connection to the wall clock anywhere in the kernel.

/// Simulated time in seconds.
///
/// # Invariants
///
/// - The clock never moves backwards. [`VirtualClock::advance_to`] refuses
///   earlier times and reports the attempt to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VirtualClock {
    now: f64,
}

impl VirtualClock {
    /// Create a clock at time zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { now: 0.0 }
    }

    /// Get the current simulated time.
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Move the clock forward to `time`.
    ///
    /// Returns `false` (and leaves the clock untouched) if `time` is earlier
    /// than the current time.
    pub fn advance_to(&mut self, time: f64) -> bool {
        if time < self.now {
            return false;
        }
        self.now = time;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_initial() {
        let clock = VirtualClock::new();
        assert!(clock.now().abs() < f64::EPSILON);
    }

    #[test]
    fn test_clock_advance() {
        let mut clock = VirtualClock::new();
        assert!(clock.advance_to(1.5));
        assert!((clock.now() - 1.5).abs() < f64::EPSILON);

        // Same time is allowed
        assert!(clock.advance_to(1.5));
    }

    #[test]
    fn test_clock_is_monotonic() {
        let mut clock = VirtualClock::new();
        clock.advance_to(10.0);

        assert!(!clock.advance_to(3.0));
        assert!((clock.now() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clock_deterministic() {
        let mut clock1 = VirtualClock::new();
        let mut clock2 = VirtualClock::new();

        for step in 1..=100 {
            let time = f64::from(step) * 0.1;
            clock1.advance_to(time);
            clock2.advance_to(time);
        }

        assert!((clock1.now() - clock2.now()).abs() < f64::EPSILON);
    }
}
