//! JSON fetch utilities, atomic file writes and the completion store.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "oppscan-storage";

pub const DEFAULT_USER_AGENT: &str = concat!(
    "oppscan/",
    env!("CARGO_PKG_VERSION"),
    " (contact: outreach@socialtradingvlog.com)"
);

/// Why a fetch produced no payload. Adapters treat every variant the same way:
/// the query contributes no items.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can answer a GET with a decoded JSON document.
#[async_trait]
pub trait JsonSource: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<JsonValue, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub default_headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: vec![("Accept".to_string(), "application/json".to_string())],
        }
    }
}

/// Single-shot HTTP GET + JSON decode. No retries, no caching.
#[derive(Debug, Clone)]
pub struct HttpJsonFetcher {
    client: reqwest::Client,
}

impl HttpJsonFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    /// GET `url` with `extra_headers` layered over the defaults.
    pub async fn fetch_json_with(
        &self,
        url: &str,
        extra_headers: HeaderMap,
    ) -> Result<JsonValue, FetchError> {
        let span = info_span!("http_fetch", url);
        async move {
            let resp = self.client.get(url).headers(extra_headers).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let body = resp.bytes().await?;
            let value = serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                url: final_url,
                source,
            })?;
            debug!(bytes = body.len(), "fetched json");
            Ok(value)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl JsonSource for HttpJsonFetcher {
    async fn fetch_json(&self, url: &str) -> Result<JsonValue, FetchError> {
        self.fetch_json_with(url, HeaderMap::new()).await
    }
}

/// Fixture-backed source: exact URL -> payload. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct StaticJsonSource {
    responses: HashMap<String, JsonValue>,
}

impl StaticJsonSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, payload: JsonValue) -> Self {
        self.responses.insert(url.into(), payload);
        self
    }
}

#[async_trait]
impl JsonSource for StaticJsonSource {
    async fn fetch_json(&self, url: &str) -> Result<JsonValue, FetchError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
///
/// Readers see either the previous file or the complete new one.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| format!("writing temp file {}", temp_path.display()));
    }

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// Persistent set of stable ids the user has marked done.
///
/// Stored as a sorted JSON array with two-space indent. Shared with the
/// dashboard; every write goes through [`write_atomic`].
#[derive(Debug, Clone)]
pub struct CompletionStore {
    path: PathBuf,
}

impl CompletionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files load as the empty set.
    pub async fn load(&self) -> BTreeSet<String> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(_) => return BTreeSet::new(),
        };
        match serde_json::from_str::<Vec<String>>(&text) {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "ignoring corrupt completion file");
                BTreeSet::new()
            }
        }
    }

    pub async fn save(&self, done: &BTreeSet<String>) -> anyhow::Result<()> {
        let ids = done.iter().collect::<Vec<_>>();
        let mut text = serde_json::to_string_pretty(&ids).context("serializing completion set")?;
        text.push('\n');
        write_atomic(&self.path, text.as_bytes()).await
    }

    /// Flip one id and persist. Returns `true` when the id is now done.
    pub async fn toggle(&self, id: &str) -> anyhow::Result<bool> {
        let mut done = self.load().await;
        let now_done = if done.remove(id) {
            false
        } else {
            done.insert(id.to_string());
            true
        };
        self.save(&done).await?;
        Ok(now_done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_completion_file_is_empty() {
        let dir = tempdir().expect("tempdir");
        let store = CompletionStore::new(dir.path().join("outreach/opportunities-done.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_completion_file_is_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("done.json");
        std::fs::write(&path, "{not json").expect("write");
        let store = CompletionStore::new(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_writes_sorted_two_space_array_and_creates_parent() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("outreach/opportunities-done.json");
        let store = CompletionStore::new(&path);
        store.save(&ids(&["zeta", "alpha"])).await.expect("save");

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text, "[\n  \"alpha\",\n  \"zeta\"\n]\n");
        assert_eq!(store.load().await, ids(&["alpha", "zeta"]));
    }

    #[tokio::test]
    async fn toggles_remove_and_add_ids() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("opportunities-done.json");
        std::fs::write(&path, r#"["abc123", "def456"]"#).expect("seed");
        let store = CompletionStore::new(&path);

        assert!(!store.toggle("abc123").await.expect("toggle off"));
        assert!(store.toggle("ghi789").await.expect("toggle on"));

        let on_disk: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(on_disk, vec!["def456".to_string(), "ghi789".to_string()]);
    }

    #[tokio::test]
    async fn atomic_write_replaces_without_leaving_temp_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("reports/opportunities-latest.md");
        write_atomic(&path, b"first").await.expect("first write");
        write_atomic(&path, b"second").await.expect("second write");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "second");
        let leftovers = std::fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn static_source_serves_known_urls_and_404s_the_rest() {
        let source = StaticJsonSource::new().with("https://example.test/a", serde_json::json!({"ok": true}));
        let hit = source.fetch_json("https://example.test/a").await.expect("hit");
        assert_eq!(hit["ok"], true);

        let miss = source.fetch_json("https://example.test/b").await.unwrap_err();
        assert!(matches!(miss, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn http_fetcher_reports_connection_failures_as_errors() {
        let fetcher = HttpJsonFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .expect("client");
        let result = fetcher.fetch_json("http://127.0.0.1:9/unreachable.json").await;
        assert!(matches!(result, Err(FetchError::Request(_))));
    }
}
