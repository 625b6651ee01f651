//! Vector clocks over runners, for happens-before tracking.
//!
//! The happens-before relation the search maintains is the transitive
//! closure of the per-step dependency edges plus program order within a
//! runner; each applied step is stamped with the executing runner's clock.

use crate::types::RunnerId;

/// A vector clock indexed by runner id. Grows on demand as runners are
/// observed; absent components read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockVector {
    clocks: Vec<u32>,
}

impl ClockVector {
    /// The all-zero clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The component for a runner (zero if never touched).
    #[must_use]
    pub fn get(&self, runner: RunnerId) -> u32 {
        self.clocks.get(runner.index()).copied().unwrap_or(0)
    }

    /// Bump the component for a runner.
    pub fn increment(&mut self, runner: RunnerId) {
        let index = runner.index();
        if index >= self.clocks.len() {
            self.clocks.resize(index + 1, 0);
        }
        self.clocks[index] += 1;
    }

    /// Point-wise maximum: `self = max(self, other)`.
    pub fn join(&mut self, other: &Self) {
        if other.clocks.len() > self.clocks.len() {
            self.clocks.resize(other.clocks.len(), 0);
        }
        for (mine, theirs) in self.clocks.iter_mut().zip(other.clocks.iter()) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// True iff `self <= other` component-wise.
    #[must_use]
    pub fn partial_le(&self, other: &Self) -> bool {
        self.clocks
            .iter()
            .enumerate()
            .all(|(i, &mine)| mine <= other.clocks.get(i).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(n: u32) -> RunnerId {
        RunnerId::new(n)
    }

    #[test]
    fn absent_components_read_zero() {
        let cv = ClockVector::new();
        assert_eq!(cv.get(rid(5)), 0);
    }

    #[test]
    fn increment_and_get() {
        let mut cv = ClockVector::new();
        cv.increment(rid(2));
        cv.increment(rid(2));
        assert_eq!(cv.get(rid(2)), 2);
        assert_eq!(cv.get(rid(0)), 0);
    }

    #[test]
    fn join_takes_pointwise_max() {
        let mut a = ClockVector::new();
        a.increment(rid(0));
        a.increment(rid(0));
        let mut b = ClockVector::new();
        b.increment(rid(0));
        b.increment(rid(1));
        a.join(&b);
        assert_eq!(a.get(rid(0)), 2);
        assert_eq!(a.get(rid(1)), 1);
    }

    #[test]
    fn partial_le_handles_length_mismatch() {
        let mut a = ClockVector::new();
        a.increment(rid(0));
        let mut b = ClockVector::new();
        b.increment(rid(0));
        b.increment(rid(3));
        assert!(a.partial_le(&b));
        assert!(!b.partial_le(&a));
    }
}
