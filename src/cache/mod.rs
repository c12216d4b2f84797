//! On-disk response cache.
//!
//! One JSON file per cache key under the configured directory. The key is the
//! SHA-256 of the request URL with its fragment removed, so `#foo` variants
//! share an entry while different query strings do not. Cache failures never
//! reach the caller: unreadable entries are misses, and failed writes are
//! logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::LOG_TARGET_CACHE;
use crate::fetch::response::materialize::decode_body;
use crate::fetch::response::{MediaType, ResponseBody, ResponseRecord};

/// Derives the cache file name for a URL.
pub fn cache_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    hex::encode(Sha256::digest(normalized.as_str().as_bytes()))
}

/// Persisted snapshot of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: u16,
    pub header: BTreeMap<String, Vec<String>>,
    /// Parsed JSON, the text for other textual bodies, or hex for binary ones.
    /// Informational; the record is rebuilt from `buffer`.
    pub body: Value,
    pub text: Option<String>,
    /// Hex of the raw body bytes as received.
    pub buffer: String,
    /// Full Content-Type header value.
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl CacheEntry {
    /// Snapshots a buffered record. Streamed bodies cannot be cached.
    pub fn from_record(record: &ResponseRecord, timestamp: i64) -> Option<Self> {
        let buffer = record.buffer.as_ref()?;
        let body = match &record.body {
            ResponseBody::Empty => Value::Null,
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Text(text) => Value::String(text.clone()),
            ResponseBody::Form(_) => Value::String(record.text.clone().unwrap_or_default()),
            ResponseBody::Bytes(bytes) => Value::String(hex::encode(bytes)),
            ResponseBody::Stream(_) => return None,
        };

        let mut header: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in &record.headers {
            header
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        Some(Self {
            status: record.status_code,
            header,
            body,
            text: record.text.clone(),
            buffer: hex::encode(buffer),
            content_type: record.content_type.as_ref().map(MediaType::to_string),
            timestamp,
        })
    }

    /// Whether the entry may still be served at `now` (epoch milliseconds).
    pub fn is_fresh(&self, max_age: Duration, now: i64) -> bool {
        let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        self.status == 200 && now < self.timestamp.saturating_add(max_age)
    }

    /// Rebuilds the response record for `url`.
    ///
    /// The body is decoded again from the stored bytes, exactly as the live
    /// response was.
    ///
    /// # Errors
    ///
    /// Fails when `buffer` is not valid hex.
    pub fn into_record(self, url: &Url) -> Result<ResponseRecord, hex::FromHexError> {
        let buffer = Bytes::from(hex::decode(&self.buffer)?);

        let mut headers = HeaderMap::new();
        let mut raw_headers = Vec::new();
        for (name, values) in &self.header {
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    headers.append(header_name.clone(), header_value);
                    raw_headers.push((name.clone(), value.clone()));
                }
            }
        }

        let content_type = self.content_type.as_deref().and_then(MediaType::parse);
        let (body, text) = decode_body(&buffer, content_type.as_ref(), self.status)
            .unwrap_or_else(|_| (ResponseBody::Bytes(buffer.clone()), self.text));

        let status_message = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();

        Ok(ResponseRecord {
            url: url.to_string(),
            status_code: self.status,
            status_message,
            headers,
            raw_headers,
            body,
            text,
            buffer: Some(buffer),
            redirects: Vec::new(),
            content_type,
            cached: true,
        })
    }
}

/// A cache directory with a freshness window.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    max_age: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn entry_path(&self, url: &Url) -> PathBuf {
        self.dir.join(cache_key(url))
    }

    /// Returns the cached record for `url`, or `None` on any miss.
    pub async fn lookup(&self, url: &Url) -> Option<ResponseRecord> {
        let path = self.entry_path(url);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(target: LOG_TARGET_CACHE, "Cache entry {} unreadable: {e}", path.display());
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(target: LOG_TARGET_CACHE, "Cache entry {} corrupt: {e}", path.display());
                return None;
            }
        };

        let now = chrono::Utc::now().timestamp_millis();
        if !entry.is_fresh(self.max_age, now) {
            debug!(target: LOG_TARGET_CACHE, "Cache entry for {url} is stale or not a 200");
            return None;
        }
        match entry.into_record(url) {
            Ok(record) => {
                debug!(target: LOG_TARGET_CACHE, "Cache hit for {url}");
                Some(record)
            }
            Err(e) => {
                debug!(target: LOG_TARGET_CACHE, "Cache entry {} corrupt: {e}", path.display());
                None
            }
        }
    }

    /// Stores a successful buffered response. Failures are logged, not returned.
    pub async fn store(&self, url: &Url, record: &ResponseRecord) {
        if record.status_code != 200 {
            debug!(target: LOG_TARGET_CACHE, "Not caching {url}: status {}", record.status_code);
            return;
        }
        let Some(entry) = CacheEntry::from_record(record, chrono::Utc::now().timestamp_millis())
        else {
            debug!(target: LOG_TARGET_CACHE, "Not caching {url}: body was not buffered");
            return;
        };
        let path = self.entry_path(url);
        if let Err(e) = write_entry(&path, &entry).await {
            warn!(target: LOG_TARGET_CACHE, "Failed to write cache entry {}: {e}", path.display());
        }
    }
}

async fn write_entry(path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec(entry)?;
    tokio::fs::write(path, data).await
}
