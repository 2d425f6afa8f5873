//! Monotonic timestamp source for the single writer

use chrono::Utc;

/// Hands out strictly increasing nanosecond timestamps
///
/// Wall-clock readings that do not move forward are bumped to one past the
/// last issued value, so log keys never collide and history order is total.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    last: i64,
}

impl Clock {
    /// Start after the newest timestamp already in the log
    pub fn resume_after(last: i64) -> Self {
        Self { last }
    }

    /// Next timestamp
    pub fn stamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        self.last = now.max(self.last.saturating_add(1));
        self.last
    }

    /// Last issued timestamp
    pub fn last(&self) -> i64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let mut clock = Clock::default();
        let mut previous = clock.stamp();
        for _ in 0..1000 {
            let next = clock.stamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_resume_after_future_timestamp() {
        let future = Utc::now().timestamp_nanos_opt().unwrap() + 3_600_000_000_000;
        let mut clock = Clock::resume_after(future);
        assert_eq!(clock.stamp(), future + 1);
        assert_eq!(clock.last(), future + 1);
    }
}
