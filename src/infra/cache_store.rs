use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::app::ports::CacheStorePort;
use crate::constants::{EMPTY_KEY_TOKEN, LEGACY_PAYLOAD_EXTENSION, METADATA_EXTENSION, PAYLOAD_EXTENSION};
use crate::domain::{CacheMetadata, CacheRecord, ContentKind, Validators};
use crate::error::{Result, TleError};
use crate::observability::metrics;

static UNSAFE_KEY_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid key regex"));

/// Map an arbitrary query key to a token that is safe as a file name stem.
pub fn sanitize_key(key: &str) -> String {
    if key.is_empty() {
        return EMPTY_KEY_TOKEN.to_string();
    }
    UNSAFE_KEY_CHARS.replace_all(key, "_").into_owned()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Flat file cache: `<token>.meta.json` plus `<token>.payload.bin` per key.
///
/// Older installs wrote a single `<token>.tle` payload; it is migrated to the
/// current layout the first time it is read.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", sanitize_key(key), METADATA_EXTENSION))
    }

    pub fn payload_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", sanitize_key(key), PAYLOAD_EXTENSION))
    }

    pub fn legacy_payload_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", sanitize_key(key), LEGACY_PAYLOAD_EXTENSION))
    }

    async fn read_metadata(&self, key: &str) -> Option<CacheMetadata> {
        let path = self.metadata_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cache metadata unreadable at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice::<CacheMetadata>(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("cache metadata corrupt at {}: {}", path.display(), e);
                metrics::cache_corrupt_entry();
                None
            }
        }
    }

    async fn read_payload(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.payload_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => return Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("cache payload unreadable at {}: {}", path.display(), e);
                return None;
            }
        }

        let legacy = self.legacy_payload_path(key);
        let bytes = tokio::fs::read(&legacy).await.ok()?;
        if let Err(e) = self.migrate_legacy(&legacy, &path, &bytes).await {
            // Still serve the bytes; migration is retried on the next read
            warn!("legacy cache migration failed for {}: {}", legacy.display(), e);
        }
        Some(bytes)
    }

    async fn migrate_legacy(&self, legacy: &Path, current: &Path, bytes: &[u8]) -> Result<()> {
        write_atomic(current, bytes).await?;
        match tokio::fs::remove_file(legacy).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("migrated legacy cache payload {} -> {}", legacy.display(), current.display());
        Ok(())
    }
}

#[async_trait]
impl CacheStorePort for FsCacheStore {
    async fn load(&self, key: &str) -> Option<CacheRecord> {
        let Some(metadata) = self.read_metadata(key).await else {
            debug!(key, "cache miss: no metadata");
            metrics::cache_miss();
            return None;
        };
        if metadata.query_key != key {
            // Two keys sanitized to the same token
            debug!(key, stored = %metadata.query_key, "cache miss: entry belongs to another key");
            metrics::cache_miss();
            return None;
        }
        let Some(payload) = self.read_payload(key).await else {
            debug!(key, "cache miss: metadata without payload");
            metrics::cache_miss();
            return None;
        };
        if let Some(expected) = metadata.payload_sha256.as_deref() {
            if sha256_hex(&payload) != expected {
                warn!(key, "cache payload does not match its metadata checksum");
                metrics::cache_corrupt_entry();
                return None;
            }
        }
        Some(CacheRecord { metadata, payload })
    }

    async fn save(
        &self,
        key: &str,
        payload: &[u8],
        source_url: &str,
        fetched_at: DateTime<Utc>,
        content_kind: ContentKind,
        validators: &Validators,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut metadata = CacheMetadata::new(key, fetched_at, source_url, content_kind, validators);
        metadata.payload_sha256 = Some(sha256_hex(payload));
        let encoded = serde_json::to_vec_pretty(&metadata).map_err(|e| TleError::Storage(e.to_string()))?;

        // Payload first so metadata never points at bytes that are not on disk yet
        write_atomic(&self.payload_path(key), payload).await?;
        write_atomic(&self.metadata_path(key), &encoded).await?;
        info!(key, bytes = payload.len(), content_type = %content_kind, "cache entry written");
        Ok(())
    }
}

/// Write to a sibling temp file, fsync, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| TleError::Storage(format!("no parent directory for {}", path.display())))?;
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("entry");
    let tmp = parent.join(format!(".{}.tmp.{}", file_name, uuid::Uuid::new_v4()));

    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(TleError::Storage(format!("atomic write to {} failed: {}", path.display(), e)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"ISS (ZARYA)\n1 25544U\n2 25544 \n";

    fn validators() -> Validators {
        Validators { etag: Some("\"v1\"".into()), last_modified: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()) }
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("ISS (ZARYA)"), "ISS__ZARYA_");
        assert_eq!(sanitize_key("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_key("group:stations"), "group_stations");
        assert_eq!(sanitize_key("STARLINK-1007_a"), "STARLINK-1007_a");
        assert_eq!(sanitize_key(""), EMPTY_KEY_TOKEN);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path().join("tle"));
        let fetched_at = Utc::now();
        store
            .save("ISS", PAYLOAD, "https://example.invalid/gp", fetched_at, ContentKind::Text, &validators())
            .await
            .unwrap();

        let record = store.load("ISS").await.expect("cached record");
        assert_eq!(record.payload, PAYLOAD);
        assert_eq!(record.metadata.query_key, "ISS");
        assert_eq!(record.metadata.fetched_at, fetched_at);
        assert_eq!(record.metadata.content_type, "text");
        assert_eq!(record.metadata.validators(), validators());
        assert_eq!(record.metadata.payload_sha256.as_deref(), Some(sha256_hex(PAYLOAD).as_str()));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        store.save("ISS", PAYLOAD, "u", Utc::now(), ContentKind::Text, &Validators::default()).await.unwrap();
        store.save("ISS", b"1 a\n2 a", "u", Utc::now(), ContentKind::Text, &Validators::default()).await.unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
        assert!(names.iter().all(|n| !n.contains(".tmp.")));
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        assert!(store.load("nothing").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        store.save("ISS", PAYLOAD, "u", Utc::now(), ContentKind::Text, &validators()).await.unwrap();
        std::fs::write(store.metadata_path("ISS"), b"{ not json").unwrap();
        assert!(store.load("ISS").await.is_none());
    }

    #[tokio::test]
    async fn test_metadata_without_payload_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        store.save("ISS", PAYLOAD, "u", Utc::now(), ContentKind::Text, &validators()).await.unwrap();
        std::fs::remove_file(store.payload_path("ISS")).unwrap();
        assert!(store.load("ISS").await.is_none());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        store.save("ISS", PAYLOAD, "u", Utc::now(), ContentKind::Text, &validators()).await.unwrap();
        std::fs::write(store.payload_path("ISS"), b"torn").unwrap();
        assert!(store.load("ISS").await.is_none());
    }

    #[tokio::test]
    async fn test_colliding_tokens_do_not_alias() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        store.save("a b", PAYLOAD, "u", Utc::now(), ContentKind::Text, &validators()).await.unwrap();
        assert_eq!(store.metadata_path("a b"), store.metadata_path("a_b"));
        assert!(store.load("a_b").await.is_none());
        assert!(store.load("a b").await.is_some());
    }

    #[tokio::test]
    async fn test_legacy_payload_is_migrated_once() {
        let dir = TempDir::new().unwrap();
        let store = FsCacheStore::new(dir.path());
        // Legacy metadata carried no checksum or version
        let legacy_meta = r#"{"query_key":"ISS","fetched_at":"2024-01-01T00:00:00Z","source_url":"u","content_type":"text","etag":"\"old\""}"#;
        std::fs::write(store.metadata_path("ISS"), legacy_meta).unwrap();
        std::fs::write(store.legacy_payload_path("ISS"), PAYLOAD).unwrap();

        let first = store.load("ISS").await.expect("legacy record");
        assert_eq!(first.payload, PAYLOAD);
        assert_eq!(first.metadata.etag.as_deref(), Some("\"old\""));
        assert!(!store.legacy_payload_path("ISS").exists());
        assert_eq!(std::fs::read(store.payload_path("ISS")).unwrap(), PAYLOAD);

        let second = store.load("ISS").await.expect("migrated record");
        assert_eq!(second, first);
    }
}
