//! Wall-clock reconciliation for the session countdown.
//!
//! Timer wakeups are not trusted to arrive once per second. The driver measures
//! how much time actually passed since its last wakeup and asks the reconciler
//! how many whole seconds that is, carrying the sub-second rest forward.

use std::time::Duration;

const SECOND: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReconciler {
    carry: Duration,
}

impl TickReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb `elapsed` wall-clock time and return the whole seconds now due.
    pub fn absorb(&mut self, elapsed: Duration) -> u32 {
        let total = self.carry.saturating_add(elapsed);
        let whole = total.as_secs();
        self.carry = total - Duration::from_secs(whole);
        u32::try_from(whole).unwrap_or(u32::MAX)
    }

    /// Sub-second time carried into the next call.
    #[must_use]
    pub fn carry(&self) -> Duration {
        self.carry
    }

    pub fn reset(&mut self) {
        self.carry = Duration::ZERO;
    }

    /// Delay until the next whole second becomes due.
    #[must_use]
    pub fn until_next_second(&self) -> Duration {
        SECOND.saturating_sub(self.carry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_seconds_are_due_immediately() {
        let mut r = TickReconciler::new();
        assert_eq!(r.absorb(Duration::from_secs(1)), 1);
        assert_eq!(r.absorb(Duration::from_secs(3)), 3);
        assert_eq!(r.carry(), Duration::ZERO);
    }

    #[test]
    fn fractions_carry_over() {
        let mut r = TickReconciler::new();
        assert_eq!(r.absorb(Duration::from_millis(600)), 0);
        assert_eq!(r.absorb(Duration::from_millis(600)), 1);
        assert_eq!(r.carry(), Duration::from_millis(200));
        assert_eq!(r.until_next_second(), Duration::from_millis(800));
    }

    #[test]
    fn long_gap_catches_up_in_one_call() {
        let mut r = TickReconciler::new();
        assert_eq!(r.absorb(Duration::from_millis(45_250)), 45);
        assert_eq!(r.carry(), Duration::from_millis(250));
        r.reset();
        assert_eq!(r.carry(), Duration::ZERO);
    }

    #[test]
    fn zero_elapsed_yields_nothing() {
        let mut r = TickReconciler::new();
        assert_eq!(r.absorb(Duration::ZERO), 0);
    }
}
