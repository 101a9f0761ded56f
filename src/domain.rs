use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{DEBRIS_MARKER, METADATA_VERSION};
use crate::error::TleError;

/// One orbital element set: an optional display name plus the two
/// fixed-format data lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

impl ElementRecord {
    pub fn new(name: Option<String>, line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self { name, line1: line1.into(), line2: line2.into() }
    }

    /// True when the display name carries the debris marker as a separate word.
    pub fn is_debris(&self) -> bool {
        self.name
            .as_deref()
            .map(|n| n.split_whitespace().any(|w| w.eq_ignore_ascii_case(DEBRIS_MARKER)))
            .unwrap_or(false)
    }
}

/// Wire format of a payload. Persisted as the `content_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Text,
}

impl ContentKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            ContentKind::Json => "json",
            ContentKind::Text => "text",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "json" | "application/json" => Some(ContentKind::Json),
            "text" | "tle" | "text/plain" => Some(ContentKind::Text),
            _ => None,
        }
    }

    /// Guess the format from the bytes themselves.
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') | Some(b'{') => ContentKind::Json,
            _ => ContentKind::Text,
        }
    }

    /// Value of the source's `FORMAT=` query parameter.
    pub fn format_param(&self) -> &'static str {
        match self {
            ContentKind::Json => "json",
            ContentKind::Text => "tle",
        }
    }

    pub fn accept_header(&self) -> &'static str {
        match self {
            ContentKind::Json => "application/json",
            ContentKind::Text => "text/plain",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// HTTP cache validators replayed on conditional requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Overlay `newer` on top of `self`; fields absent in `newer` keep their old value.
    pub fn merged_with(&self, newer: &Validators) -> Validators {
        Validators {
            etag: newer.etag.clone().or_else(|| self.etag.clone()),
            last_modified: newer.last_modified.clone().or_else(|| self.last_modified.clone()),
        }
    }
}

fn default_metadata_version() -> u32 {
    1
}

/// Structured half of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(default = "default_metadata_version")]
    pub version: u32,
    pub query_key: String,
    pub fetched_at: DateTime<Utc>,
    pub source_url: String,
    pub content_type: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub payload_sha256: Option<String>,
}

impl CacheMetadata {
    pub fn new(
        query_key: &str,
        fetched_at: DateTime<Utc>,
        source_url: &str,
        content_kind: ContentKind,
        validators: &Validators,
    ) -> Self {
        Self {
            version: METADATA_VERSION,
            query_key: query_key.to_string(),
            fetched_at,
            source_url: source_url.to_string(),
            content_type: content_kind.as_tag().to_string(),
            etag: validators.etag.clone(),
            last_modified: validators.last_modified.clone(),
            payload_sha256: None,
        }
    }

    pub fn validators(&self) -> Validators {
        Validators { etag: self.etag.clone(), last_modified: self.last_modified.clone() }
    }
}

/// A complete cache entry: metadata plus the raw payload it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub metadata: CacheMetadata,
    pub payload: Vec<u8>,
}

impl CacheRecord {
    /// Content kind from the stored tag, falling back to sniffing the payload.
    pub fn content_kind(&self) -> ContentKind {
        ContentKind::from_tag(&self.metadata.content_type)
            .unwrap_or_else(|| ContentKind::sniff(&self.payload))
    }
}

/// Body returned by a successful (2xx) fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPayload {
    pub bytes: Vec<u8>,
    pub content_kind: ContentKind,
    pub source_url: String,
    pub validators: Validators,
}

/// Outcome of one remote attempt: a fresh body (200) or "unchanged" (304).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Payload(FetchedPayload),
    NotModified { validators: Validators, source_url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Network,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Cache => f.write_str("cache"),
            Provenance::Network => f.write_str("network"),
        }
    }
}

/// What a consumer receives from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryResult {
    pub records: Vec<ElementRecord>,
    pub fetched_at: DateTime<Utc>,
    pub provenance: Provenance,
    /// Set when cached data is served because the network leg failed.
    pub fallback: Option<TleError>,
}

impl RepositoryResult {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingDecision {
    pub should_schedule: bool,
    pub earliest_time: Option<DateTime<Utc>>,
}

impl SchedulingDecision {
    pub fn skip() -> Self {
        Self { should_schedule: false, earliest_time: None }
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self { should_schedule: true, earliest_time: Some(time) }
    }
}

/// Per-key load status a host can bind UI state to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded(RepositoryResult),
    Failed(TleError),
}

impl LoadState {
    pub fn from_outcome(outcome: Result<RepositoryResult, TleError>) -> Self {
        match outcome {
            Ok(result) => LoadState::Loaded(result),
            Err(err) => LoadState::Failed(err),
        }
    }

    pub fn records(&self) -> &[ElementRecord] {
        match self {
            LoadState::Loaded(result) => &result.records,
            _ => &[],
        }
    }
}
