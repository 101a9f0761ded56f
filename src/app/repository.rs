use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::ports::{CacheStorePort, RemoteFetchPort};
use crate::app::staleness::StalenessPolicy;
use crate::constants::DEFAULT_BACKOFF_SECS;
use crate::domain::{
    CacheMetadata, CacheRecord, ContentKind, ElementRecord, FetchResult, Provenance, RepositoryResult, Validators,
};
use crate::error::{Result, TleError};
use crate::observability::metrics;
use crate::parser;

#[derive(Debug, Clone, Copy)]
pub struct RepositorySettings {
    pub staleness: StalenessPolicy,
    /// How long a key stays blocked after the source denies or rate-limits it.
    pub backoff_window: Duration,
    /// Upper bound on one remote fetch; hitting it counts as a transport failure.
    pub fetch_timeout: std::time::Duration,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            staleness: StalenessPolicy::default(),
            backoff_window: Duration::seconds(DEFAULT_BACKOFF_SECS),
            fetch_timeout: std::time::Duration::from_secs(30),
        }
    }
}

type Outcome = Result<RepositoryResult>;

#[derive(Debug, Clone)]
struct Backoff {
    until: DateTime<Utc>,
    cause: TleError,
}

#[derive(Default)]
struct SharedState {
    in_flight: HashMap<String, watch::Receiver<Option<Outcome>>>,
    backoff: HashMap<String, Backoff>,
}

struct Inner {
    cache: Arc<dyn CacheStorePort>,
    remote: Arc<dyn RemoteFetchPort>,
    settings: RepositorySettings,
    state: Mutex<SharedState>,
}

/// Cache-first access to element sets with single-flight revalidation.
///
/// Read outcomes, per key:
/// 1. fresh cache hit (`cache`)
/// 2. network fetch or 304 revalidation (`network`)
/// 3. stale cache served after a failed fetch (`cache`, `fallback` set)
/// 4. error, when nothing usable is cached
/// 5. suppressed during backoff: cached value or the blocking error
#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    pub fn new(
        cache: Arc<dyn CacheStorePort>,
        remote: Arc<dyn RemoteFetchPort>,
        settings: RepositorySettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { cache, remote, settings, state: Mutex::new(SharedState::default()) }),
        }
    }

    /// Serve from cache when fresh, otherwise revalidate against the source.
    pub async fn get_tles(&self, key: &str) -> Result<RepositoryResult> {
        if let Some(record) = self.inner.cache.load(key).await {
            let fetched_at = record.metadata.fetched_at;
            if !self.inner.settings.staleness.is_stale(Some(fetched_at), Utc::now()) {
                match decode(&record) {
                    Ok(records) => {
                        debug!(key, %fetched_at, "serving fresh cache entry");
                        metrics::cache_hit();
                        return Ok(RepositoryResult { records, fetched_at, provenance: Provenance::Cache, fallback: None });
                    }
                    Err(e) => warn!(key, error = %e, "cached payload no longer parses, refetching"),
                }
            } else {
                debug!(key, %fetched_at, "cache entry is stale");
            }
        }
        self.join_or_start(key).await
    }

    /// Go to the network regardless of freshness, falling back to any cached value.
    pub async fn refresh_tles(&self, key: &str) -> Result<RepositoryResult> {
        self.join_or_start(key).await
    }

    /// Stored metadata for `key`, without touching the network.
    pub async fn cached_metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.inner.cache.load(key).await.map(|r| r.metadata)
    }

    /// End of the active backoff window for `key`, if any.
    pub fn blocked_until(&self, key: &str) -> Option<DateTime<Utc>> {
        self.inner.active_backoff(key, Utc::now()).map(|b| b.until)
    }

    /// Await the fetch already running for `key`, or start one.
    ///
    /// The fetch runs on its own task, so a caller that gives up waiting does
    /// not cancel it for the others.
    async fn join_or_start(&self, key: &str) -> Outcome {
        let (mut rx, leader) = {
            let mut state = self.inner.lock_state();
            match state.in_flight.get(key) {
                Some(rx) => {
                    debug!(key, "joining in-flight fetch");
                    metrics::single_flight_join();
                    (rx.clone(), None)
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.in_flight.insert(key.to_string(), rx.clone());
                    (rx, Some(tx))
                }
            }
        };

        // Spawn only once the state lock is released; InFlight::drop takes it again
        if let Some(tx) = leader {
            let registration = InFlight { inner: Arc::clone(&self.inner), key: key.to_string() };
            tokio::spawn(async move {
                let outcome = registration.inner.fetch_and_store(&registration.key).await;
                // Deregister before publishing so late arrivals start a new fetch
                drop(registration);
                let _ = tx.send(Some(outcome));
            });
        }

        let shared = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TleError::TransportFailure("fetch task ended without a result".into()))?;
        (*shared)
            .clone()
            .unwrap_or_else(|| Err(TleError::TransportFailure("fetch task ended without a result".into())))
    }
}

/// Removes the in-flight entry when the fetch task finishes or unwinds.
struct InFlight {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.lock_state().in_flight.remove(&self.key);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The backoff entry for `key` if still active; expired entries are cleared.
    fn active_backoff(&self, key: &str, now: DateTime<Utc>) -> Option<Backoff> {
        let mut state = self.lock_state();
        let active = state.backoff.get(key).map(|b| now < b.until)?;
        if active {
            return state.backoff.get(key).cloned();
        }
        state.backoff.remove(key);
        info!(key, "backoff window elapsed");
        None
    }

    fn open_backoff(&self, key: &str, cause: TleError) {
        let until = Utc::now() + self.settings.backoff_window;
        warn!(key, %until, error = %cause, "source is refusing requests, backing off");
        self.lock_state().backoff.insert(key.to_string(), Backoff { until, cause });
    }

    async fn fetch_and_store(&self, key: &str) -> Outcome {
        // A cached entry that no longer parses cannot be a fallback or a 304 baseline
        let baseline = match self.cache.load(key).await {
            Some(record) => match decode(&record) {
                Ok(records) => Some((record, records)),
                Err(e) => {
                    warn!(key, error = %e, "ignoring cached entry that does not parse");
                    None
                }
            },
            None => None,
        };

        if let Some(backoff) = self.active_backoff(key, Utc::now()) {
            metrics::backoff_short_circuit();
            debug!(key, until = %backoff.until, "fetch suppressed by backoff");
            return match baseline {
                Some((record, records)) => Ok(from_cache(&record, records, Some(backoff.cause))),
                None => Err(backoff.cause),
            };
        }

        let cached_meta = baseline.as_ref().map(|(record, _)| &record.metadata);
        let fetched = match tokio::time::timeout(
            self.settings.fetch_timeout,
            self.remote.fetch_payload(key, cached_meta),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TleError::TransportFailure(format!(
                "fetch timed out after {:?}",
                self.settings.fetch_timeout
            ))),
        };

        let outcome = match fetched {
            Ok(result) => self.apply(key, result, baseline.as_ref().map(|(record, _)| record)).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(err) => {
                if err.triggers_backoff() {
                    self.open_backoff(key, err.clone());
                }
                match baseline {
                    Some((record, records)) => {
                        warn!(key, error = %err, "fetch failed, serving cached data");
                        metrics::stale_fallback();
                        Ok(from_cache(&record, records, Some(err)))
                    }
                    None => {
                        warn!(key, error = %err, "fetch failed and nothing is cached");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Turn a fetch result into records and persist it.
    async fn apply(&self, key: &str, result: FetchResult, cached: Option<&CacheRecord>) -> Outcome {
        let fetched_at = Utc::now();
        match result {
            FetchResult::Payload(payload) => {
                // Parse before writing so a malformed dataset is never cached
                let records = parser::parse_payload(payload.content_kind, &payload.bytes)?;
                self.persist(
                    key,
                    &payload.bytes,
                    &payload.source_url,
                    fetched_at,
                    payload.content_kind,
                    &payload.validators,
                )
                .await;
                info!(key, records = records.len(), "fetched fresh dataset");
                Ok(RepositoryResult {
                    records: parser::filter_debris(records),
                    fetched_at,
                    provenance: Provenance::Network,
                    fallback: None,
                })
            }
            FetchResult::NotModified { validators, source_url } => {
                let record = cached.ok_or(TleError::NotModifiedWithoutCache)?;
                let merged = record.metadata.validators().merged_with(&validators);
                self.persist(key, &record.payload, &source_url, fetched_at, record.content_kind(), &merged)
                    .await;
                info!(key, "dataset unchanged, cache revalidated");
                Ok(RepositoryResult {
                    records: decode(record)?,
                    fetched_at,
                    provenance: Provenance::Network,
                    fallback: None,
                })
            }
        }
    }

    async fn persist(
        &self,
        key: &str,
        payload: &[u8],
        source_url: &str,
        fetched_at: DateTime<Utc>,
        kind: ContentKind,
        validators: &Validators,
    ) {
        if let Err(e) = self.cache.save(key, payload, source_url, fetched_at, kind, validators).await {
            warn!(key, error = %e, "failed to write cache entry");
            metrics::cache_write_error();
        }
    }
}

fn decode(record: &CacheRecord) -> Result<Vec<ElementRecord>> {
    parser::parse_payload(record.content_kind(), &record.payload).map(parser::filter_debris)
}

fn from_cache(record: &CacheRecord, records: Vec<ElementRecord>, fallback: Option<TleError>) -> RepositoryResult {
    RepositoryResult {
        records,
        fetched_at: record.metadata.fetched_at,
        provenance: Provenance::Cache,
        fallback,
    }
}
