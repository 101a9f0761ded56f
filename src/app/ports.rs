use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CacheMetadata, CacheRecord, ContentKind, FetchResult, Validators};
use crate::error::Result;

/// Durable key -> (payload, metadata) storage.
#[async_trait]
pub trait CacheStorePort: Send + Sync {
    /// Any unreadable or inconsistent entry is reported as `None`.
    async fn load(&self, key: &str) -> Option<CacheRecord>;

    async fn save(
        &self,
        key: &str,
        payload: &[u8],
        source_url: &str,
        fetched_at: DateTime<Utc>,
        content_kind: ContentKind,
        validators: &Validators,
    ) -> Result<()>;
}

/// Fetches the dataset for one query key, conditionally when metadata is supplied.
#[async_trait]
pub trait RemoteFetchPort: Send + Sync {
    async fn fetch_payload(&self, key: &str, cached: Option<&CacheMetadata>) -> Result<FetchResult>;
}

// Transport-level port
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, request: &HttpGetRequest) -> std::result::Result<HttpGetResult, String>;
}

#[derive(Clone, Debug, Default)]
pub struct HttpGetRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpGetRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), headers: Vec::new() }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_length: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}
