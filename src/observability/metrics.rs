//! Metric names and recording helpers for the TLE cache.
//!
//! Recording goes through the `metrics` facade; installing an exporter is
//! left to the host process.

use ::metrics::Unit;
use std::time::Duration;

/// Enum representing all metric names used in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Cache store
    CacheHits,
    CacheMisses,
    CacheCorruptEntries,
    CacheWriteErrors,

    // Remote fetches
    FetchRequests,
    FetchDuration,
    FormatFallbacks,

    // Repository coordination
    SingleFlightJoins,
    BackoffShortCircuits,
    StaleFallbacks,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CacheHits => "tle_cache_hits_total",
            MetricName::CacheMisses => "tle_cache_misses_total",
            MetricName::CacheCorruptEntries => "tle_cache_corrupt_entries_total",
            MetricName::CacheWriteErrors => "tle_cache_write_errors_total",
            MetricName::FetchRequests => "tle_fetch_requests_total",
            MetricName::FetchDuration => "tle_fetch_duration_seconds",
            MetricName::FormatFallbacks => "tle_fetch_format_fallbacks_total",
            MetricName::SingleFlightJoins => "tle_single_flight_joins_total",
            MetricName::BackoffShortCircuits => "tle_backoff_short_circuits_total",
            MetricName::StaleFallbacks => "tle_stale_fallbacks_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            CacheHits,
            CacheMisses,
            CacheCorruptEntries,
            CacheWriteErrors,
            FetchRequests,
            FetchDuration,
            FormatFallbacks,
            SingleFlightJoins,
            BackoffShortCircuits,
            StaleFallbacks,
        ]
        .into_iter()
    }

    /// (description, unit)
    pub fn metadata(&self) -> (&'static str, Option<Unit>) {
        match self {
            MetricName::CacheHits => ("Fresh cache entries served", None),
            MetricName::CacheMisses => ("Lookups that found no usable entry", None),
            MetricName::CacheCorruptEntries => ("Entries rejected as corrupt", None),
            MetricName::CacheWriteErrors => ("Failed cache writes", None),
            MetricName::FetchRequests => ("Remote fetches by outcome", None),
            MetricName::FetchDuration => ("Remote fetch duration", Some(Unit::Seconds)),
            MetricName::FormatFallbacks => ("Structured-to-text format fallbacks", None),
            MetricName::SingleFlightJoins => ("Callers that joined an in-flight fetch", None),
            MetricName::BackoffShortCircuits => ("Fetches skipped during backoff", None),
            MetricName::StaleFallbacks => ("Stale cache served after a failed fetch", None),
        }
    }
}

/// Register descriptions with whatever recorder the host installed.
pub fn describe_metrics() {
    for metric in MetricName::all_metrics() {
        let (description, unit) = metric.metadata();
        match (metric, unit) {
            (MetricName::FetchDuration, Some(unit)) => {
                ::metrics::describe_histogram!(metric.as_str(), unit, description);
            }
            (_, Some(unit)) => {
                ::metrics::describe_counter!(metric.as_str(), unit, description);
            }
            (_, None) => {
                ::metrics::describe_counter!(metric.as_str(), description);
            }
        }
    }
}

pub fn cache_hit() {
    ::metrics::counter!(MetricName::CacheHits.as_str()).increment(1);
}

pub fn cache_miss() {
    ::metrics::counter!(MetricName::CacheMisses.as_str()).increment(1);
}

pub fn cache_corrupt_entry() {
    ::metrics::counter!(MetricName::CacheCorruptEntries.as_str()).increment(1);
}

pub fn cache_write_error() {
    ::metrics::counter!(MetricName::CacheWriteErrors.as_str()).increment(1);
}

/// `outcome` is one of `payload`, `not_modified`, or an error kind label.
pub fn fetch_completed(outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!(MetricName::FetchRequests.as_str(), "outcome" => outcome).increment(1);
    ::metrics::histogram!(MetricName::FetchDuration.as_str()).record(elapsed.as_secs_f64());
}

pub fn format_fallback(reason: &'static str) {
    ::metrics::counter!(MetricName::FormatFallbacks.as_str(), "reason" => reason).increment(1);
}

pub fn single_flight_join() {
    ::metrics::counter!(MetricName::SingleFlightJoins.as_str()).increment(1);
}

pub fn backoff_short_circuit() {
    ::metrics::counter!(MetricName::BackoffShortCircuits.as_str()).increment(1);
}

pub fn stale_fallback() {
    ::metrics::counter!(MetricName::StaleFallbacks.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let names: HashSet<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("tle_")));
        assert_eq!(MetricName::FetchDuration.metadata().1, Some(Unit::Seconds));
        assert!(MetricName::all_metrics().all(|m| !m.metadata().0.is_empty()));
    }

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        describe_metrics();
        cache_hit();
        fetch_completed("payload", Duration::from_millis(5));
        format_fallback("no_usable_records");
    }
}
