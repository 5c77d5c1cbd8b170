//! Per-transfer retry schedule.
//!
//! A transfer carries an ordered list of delays. Each failure consumes the
//! first delay; once the list is empty the next failure is terminal. An
//! empty list means no retries at all.

use std::collections::VecDeque;
use std::time::Duration;

/// Remaining retry delays for one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: VecDeque<Duration>,
}

impl RetrySchedule {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    /// Build from millisecond values as they appear in config.
    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().map(|ms| Duration::from_millis(*ms)))
    }

    /// Consume and return the next delay, or `None` when retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.delays.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.delays.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.delays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_schedule_never_retries() {
        let mut s = RetrySchedule::default();
        assert!(s.is_exhausted());
        assert_eq!(s.next_delay(), None);
    }

    #[test]
    fn delays_are_consumed_in_order() {
        let mut s = RetrySchedule::from_millis(&[0, 100, 2500]);
        assert_eq!(s.remaining(), 3);
        assert_eq!(s.next_delay(), Some(Duration::ZERO));
        assert_eq!(s.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(s.remaining(), 1);
        assert_eq!(s.next_delay(), Some(Duration::from_millis(2500)));
        assert_eq!(s.next_delay(), None);
    }
}
