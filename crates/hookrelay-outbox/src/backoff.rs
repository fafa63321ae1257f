//! Retry delay policy.

use std::time::Duration;

/// Default retry delays applied after successive failed attempts.
pub const DEFAULT_BACKOFF_TABLE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(60),
    Duration::from_secs(300),
];

/// Fixed table of retry delays.
///
/// The first failure waits `table[0]`, the second `table[1]`, and so on.
/// Failures past the end of the table keep waiting the final entry, so the
/// delay never grows without bound.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    table: Vec<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            table: DEFAULT_BACKOFF_TABLE.to_vec(),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy from a custom delay table.
    ///
    /// An empty table falls back to the default so a delay can always be
    /// produced.
    pub fn new(table: Vec<Duration>) -> Self {
        if table.is_empty() {
            Self::default()
        } else {
            Self { table }
        }
    }

    /// Build a policy from delays expressed in milliseconds.
    pub fn from_millis(table_ms: &[u64]) -> Self {
        Self::new(table_ms.iter().map(|ms| Duration::from_millis(*ms)).collect())
    }

    /// Delay to wait after the Nth failed attempt, 1-indexed.
    ///
    /// Values below 1 are treated as the first failure.
    pub fn delay_after_failure(&self, failure_number: i64) -> Duration {
        let n = failure_number.max(1) as usize;
        let idx = (n - 1).min(self.table.len() - 1);
        self.table[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_walk() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_after_failure(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after_failure(2), Duration::from_secs(5));
        assert_eq!(policy.delay_after_failure(3), Duration::from_secs(15));
        assert_eq!(policy.delay_after_failure(4), Duration::from_secs(60));
        assert_eq!(policy.delay_after_failure(5), Duration::from_secs(300));
    }

    #[test]
    fn test_delay_clamps_past_table_end() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_after_failure(6), Duration::from_secs(300));
        assert_eq!(policy.delay_after_failure(7), Duration::from_secs(300));
        assert_eq!(policy.delay_after_failure(100), Duration::from_secs(300));
    }

    #[test]
    fn test_custom_table() {
        let policy = BackoffPolicy::new(vec![Duration::from_millis(10), Duration::from_millis(20)]);

        assert_eq!(policy.delay_after_failure(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after_failure(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after_failure(3), Duration::from_millis(20));
    }

    #[test]
    fn test_empty_table_falls_back_to_default() {
        let policy = BackoffPolicy::new(Vec::new());

        assert_eq!(policy.delay_after_failure(1), Duration::from_secs(1));
    }

    #[test]
    fn test_from_millis() {
        let policy = BackoffPolicy::from_millis(&[500, 1500]);

        assert_eq!(policy.delay_after_failure(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after_failure(2), Duration::from_millis(1500));
    }

    #[test]
    fn test_nonpositive_failure_number_treated_as_first() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_after_failure(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after_failure(-3), Duration::from_secs(1));
    }
}
