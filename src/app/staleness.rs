use chrono::{DateTime, Duration, Utc};

use crate::constants::DEFAULT_STALE_AFTER_SECS;

/// When a cached dataset stops counting as fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub stale_after: Duration,
}

impl StalenessPolicy {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    /// Stale when strictly older than `stale_after`. A missing timestamp is
    /// maximally stale; one in the future is fresh.
    pub fn is_stale(&self, fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match fetched_at {
            Some(fetched_at) => now.signed_duration_since(fetched_at) > self.stale_after,
            None => true,
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STALE_AFTER_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_boundary() {
        let policy = StalenessPolicy::new(Duration::hours(6));
        let now = Utc::now();
        let fresh = now - Duration::hours(5) - Duration::minutes(59);
        let stale = now - Duration::hours(6) - Duration::minutes(1);
        assert!(!policy.is_stale(Some(fresh), now));
        assert!(policy.is_stale(Some(stale), now));
        assert!(!policy.is_stale(Some(now - Duration::hours(6)), now));
    }

    #[test]
    fn test_missing_or_future_timestamps() {
        let policy = StalenessPolicy::default();
        let now = Utc::now();
        assert!(policy.is_stale(None, now));
        assert!(!policy.is_stale(Some(now + Duration::hours(1)), now));
    }
}
