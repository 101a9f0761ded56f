use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::app::ports::{HttpClientPort, HttpGetRequest, RemoteFetchPort};
use crate::constants::GROUP_KEY_PREFIX;
use crate::domain::{CacheMetadata, ContentKind, FetchResult, FetchedPayload, Validators};
use crate::error::{Result, TleError};
use crate::observability::metrics;
use crate::parser;

/// Client for the general-perturbations query endpoint.
///
/// JSON is requested first. The plain-text endpoint is tried once, only when
/// the JSON answer carries no usable records or the JSON request is refused
/// with an access-denied status.
pub struct CelestrakClient {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    user_agent: String,
}

impl CelestrakClient {
    pub fn new(http: Arc<dyn HttpClientPort>, base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), user_agent: user_agent.into() }
    }

    /// Build the query URL for `key` in the given format.
    pub fn request_url(&self, key: &str, kind: ContentKind) -> Result<String> {
        let key = key.trim();
        let (param, value) = match strip_prefix_ignore_case(key, GROUP_KEY_PREFIX) {
            Some(group) => ("GROUP", group.trim()),
            None => ("NAME", key),
        };
        if value.is_empty() {
            return Err(TleError::InvalidRequest(format!("query key {:?} selects nothing", key)));
        }
        let url = reqwest::Url::parse_with_params(&self.base_url, &[(param, value), ("FORMAT", kind.format_param())])
            .map_err(|e| TleError::InvalidRequest(format!("bad source URL {:?}: {}", self.base_url, e)))?;
        Ok(url.to_string())
    }

    pub async fn fetch_tle_text(&self, key: &str, cached: Option<&CacheMetadata>) -> Result<FetchResult> {
        let json_url = self.request_url(key, ContentKind::Json)?;
        match self.perform_request(&json_url, ContentKind::Json, cached).await {
            Ok(FetchResult::Payload(mut payload)) => match parser::parse_json(&payload.bytes) {
                Err(TleError::NoUsableRecords) => {
                    info!(key, "structured response had no usable records, retrying as text");
                    metrics::format_fallback("no_usable_records");
                    self.fetch_text(key, cached).await
                }
                // Labelled by the decoder that judged it, whatever the header said;
                // decode failures are left for the repository to reject as JSON
                _ => {
                    payload.content_kind = ContentKind::Json;
                    Ok(FetchResult::Payload(payload))
                }
            },
            Ok(not_modified) => Ok(not_modified),
            Err(err) if err.is_access_denied() => {
                warn!(key, "structured endpoint refused the request, retrying as text");
                metrics::format_fallback("access_denied");
                self.fetch_text(key, cached).await
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_text(&self, key: &str, cached: Option<&CacheMetadata>) -> Result<FetchResult> {
        let text_url = self.request_url(key, ContentKind::Text)?;
        self.perform_request(&text_url, ContentKind::Text, cached).await
    }

    /// One conditional GET, mapped onto `FetchResult`.
    pub async fn perform_request(
        &self,
        url: &str,
        kind: ContentKind,
        cached: Option<&CacheMetadata>,
    ) -> Result<FetchResult> {
        let mut request = HttpGetRequest::new(url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", kind.accept_header());
        if let Some(meta) = cached {
            if let Some(etag) = &meta.etag {
                request = request.header("If-None-Match", etag.as_str());
            }
            if let Some(last_modified) = &meta.last_modified {
                request = request.header("If-Modified-Since", last_modified.as_str());
            }
        }

        let started = Instant::now();
        let outcome = self.send(&request, kind).await;
        let label = match &outcome {
            Ok(FetchResult::Payload(_)) => "payload",
            Ok(FetchResult::NotModified { .. }) => "not_modified",
            Err(err) => err.kind(),
        };
        metrics::fetch_completed(label, started.elapsed());
        outcome
    }

    async fn send(&self, request: &HttpGetRequest, kind: ContentKind) -> Result<FetchResult> {
        let resp = self.http.get(request).await.map_err(TleError::TransportFailure)?;
        let validators = Validators { etag: resp.etag.clone(), last_modified: resp.last_modified.clone() };

        if resp.status == 304 {
            debug!(url = %request.url, "source reports not modified");
            return Ok(FetchResult::NotModified { validators, source_url: request.url.clone() });
        }
        if !(200..300).contains(&resp.status) {
            warn!(url = %request.url, status = resp.status, "source returned an error status");
            return Err(TleError::BadStatus(resp.status));
        }
        if resp.bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(TleError::EmptyBody);
        }

        let base_type = resp.content_type.split(';').next().unwrap_or("").trim();
        let content_kind = ContentKind::from_tag(base_type).unwrap_or(kind);
        info!(
            url = %request.url,
            bytes = resp.bytes.len(),
            declared_bytes = resp.content_length,
            content_type = %content_kind,
            "fetched payload"
        );
        Ok(FetchResult::Payload(FetchedPayload {
            bytes: resp.bytes,
            content_kind,
            source_url: request.url.clone(),
            validators,
        }))
    }
}

#[async_trait]
impl RemoteFetchPort for CelestrakClient {
    async fn fetch_payload(&self, key: &str, cached: Option<&CacheMetadata>) -> Result<FetchResult> {
        self.fetch_tle_text(key, cached).await
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}
