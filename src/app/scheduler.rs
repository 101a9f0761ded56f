use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::app::staleness::StalenessPolicy;
use crate::constants::DEFAULT_MIN_REARM_SECS;
use crate::domain::SchedulingDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub staleness: StalenessPolicy,
    /// Minimum gap between two scheduled background refreshes.
    pub min_rearm_interval: Duration,
}

impl RefreshPolicy {
    pub fn new(stale_after: Duration, min_rearm_interval: Duration) -> Self {
        Self { staleness: StalenessPolicy::new(stale_after), min_rearm_interval }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            staleness: StalenessPolicy::default(),
            min_rearm_interval: Duration::seconds(DEFAULT_MIN_REARM_SECS),
        }
    }
}

/// Decide whether the host should arm a background refresh.
///
/// Pure: the caller submits the OS-level task and persists `last_scheduled_at`
/// after acting on a positive decision.
pub fn decision(
    fetched_at: Option<DateTime<Utc>>,
    last_scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &RefreshPolicy,
) -> SchedulingDecision {
    if !policy.staleness.is_stale(fetched_at, now) {
        debug!("refresh not scheduled: data is fresh");
        return SchedulingDecision::skip();
    }
    if let Some(last) = last_scheduled_at {
        if now.signed_duration_since(last) < policy.min_rearm_interval {
            debug!("refresh not scheduled: last schedule at {} is too recent", last);
            return SchedulingDecision::skip();
        }
    }
    SchedulingDecision::at(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RefreshPolicy {
        RefreshPolicy::new(Duration::hours(6), Duration::hours(2))
    }

    #[test]
    fn test_stale_but_recently_scheduled_is_skipped() {
        let now = Utc::now();
        let d = decision(Some(now - Duration::hours(7)), Some(now - Duration::minutes(30)), now, &policy());
        assert!(!d.should_schedule);
        assert_eq!(d.earliest_time, None);
    }

    #[test]
    fn test_stale_and_rearm_elapsed_schedules_now() {
        let now = Utc::now();
        let d = decision(Some(now - Duration::hours(7)), Some(now - Duration::hours(3)), now, &policy());
        assert!(d.should_schedule);
        assert_eq!(d.earliest_time, Some(now));
    }

    #[test]
    fn test_fresh_data_is_never_scheduled() {
        let now = Utc::now();
        let d = decision(Some(now - Duration::hours(1)), None, now, &policy());
        assert_eq!(d, SchedulingDecision::skip());
    }

    #[test]
    fn test_never_fetched_and_never_scheduled() {
        let now = Utc::now();
        let d = decision(None, None, now, &policy());
        assert!(d.should_schedule);
    }
}
