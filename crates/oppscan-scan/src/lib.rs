//! Scan orchestration: configuration, profile, pipeline and digest output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use oppscan_adapters::{
    default_manual_platforms, manual_search_links, AdapterContext, HackerNewsAdapter,
    HackerNewsConfig, ManualPlatform, RedditAdapter, RedditConfig, SourceAdapter,
    StackExchangeAdapter, StackExchangeConfig,
};
use oppscan_core::SourceKind;
use oppscan_storage::{
    write_atomic, CompletionStore, HttpClientConfig, HttpJsonFetcher, JsonSource,
    DEFAULT_USER_AGENT,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod angle;
pub mod digest;
pub mod view;

pub use angle::{default_angle_fallback, default_angle_rules, Angle, AngleClassifier, AngleFallback, AngleRule};
pub use digest::{render_digest, DigestInput, DigestSection};
pub use view::{parse_digest, DigestView, ItemView, SectionView};

pub const CRATE_NAME: &str = "oppscan-scan";

pub const LATEST_REPORT_NAME: &str = "opportunities-latest.md";
pub const PROFILE_FILE_NAME: &str = "oppscan.yaml";

const CHECK_ERROR_CHARS: usize = 60;

/// Runtime paths and HTTP settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub project_root: PathBuf,
    pub reports_dir: PathBuf,
    pub done_file: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub web_port: u16,
}

impl ScanConfig {
    pub fn from_env() -> Self {
        let root = std::env::var("OPPSCAN_PROJECT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Self::for_root(root);
        if let Ok(agent) = std::env::var("OPPSCAN_USER_AGENT") {
            config.user_agent = agent;
        }
        config.http_timeout_secs = std::env::var("OPPSCAN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.http_timeout_secs);
        config.web_port = std::env::var("OPPSCAN_WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.web_port);
        config
    }

    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let project_root = root.into();
        Self {
            reports_dir: project_root.join("reports"),
            done_file: project_root.join("outreach").join("opportunities-done.json"),
            project_root,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 15,
            web_port: 8000,
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.reports_dir.join(LATEST_REPORT_NAME)
    }

    pub fn dated_path(&self, date: NaiveDate) -> PathBuf {
        self.reports_dir
            .join(format!("opportunities-{}.md", date.format("%Y-%m-%d")))
    }

    pub fn completion_store(&self) -> CompletionStore {
        CompletionStore::new(&self.done_file)
    }
}

/// What to scan and how to advise. Every field may be overridden from `oppscan.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanProfile {
    pub site_url: String,
    pub reddit: RedditConfig,
    pub stackexchange: StackExchangeConfig,
    pub hackernews: HackerNewsConfig,
    pub manual_platforms: Vec<ManualPlatform>,
    pub angle_rules: Vec<AngleRule>,
    pub angle_fallback: AngleFallback,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self {
            site_url: "https://socialtradingvlog.com".to_string(),
            reddit: RedditConfig::default(),
            stackexchange: StackExchangeConfig::default(),
            hackernews: HackerNewsConfig::default(),
            manual_platforms: default_manual_platforms(),
            angle_rules: default_angle_rules(),
            angle_fallback: default_angle_fallback(),
        }
    }
}

impl ScanProfile {
    /// Compiled-in defaults, overlaid with `<root>/oppscan.yaml` when present.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(PROFILE_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn classifier(&self) -> AngleClassifier {
        AngleClassifier::new(
            &self.site_url,
            self.angle_rules.clone(),
            self.angle_fallback.clone(),
        )
    }
}

/// One adapter per automated source, in digest section order.
pub fn build_adapters(profile: &ScanProfile) -> Vec<Box<dyn SourceAdapter>> {
    let mut adapters: Vec<Box<dyn SourceAdapter>> = vec![
        Box::new(RedditAdapter::new(profile.reddit.clone())),
        Box::new(StackExchangeAdapter::new(profile.stackexchange.clone())),
        Box::new(HackerNewsAdapter::new(profile.hackernews.clone())),
    ];
    adapters.sort_by_key(|a| a.kind());
    adapters
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityCheck {
    pub name: String,
    pub url: String,
    pub error: Option<String>,
}

impl ReachabilityCheck {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `  Reddit: OK` or `  Reddit: FAILED — <first 60 chars of the error>`.
    pub fn status_line(&self) -> String {
        match &self.error {
            None => format!("  {}: OK", self.name),
            Some(err) => format!(
                "  {}: FAILED — {}",
                self.name,
                oppscan_core::truncate_chars(err, CHECK_ERROR_CHARS)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub name: String,
    pub kind: SourceKind,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceCount>,
    pub total: usize,
    pub manual_platforms: usize,
    pub report_path: String,
    pub latest_path: String,
}

pub struct ScanPipeline {
    config: ScanConfig,
    profile: ScanProfile,
    source: Box<dyn JsonSource>,
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl ScanPipeline {
    pub fn new(config: ScanConfig, profile: ScanProfile) -> Result<Self> {
        let http = HttpJsonFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        })?;
        let adapters = build_adapters(&profile);
        Ok(Self {
            config,
            profile,
            source: Box::new(http),
            adapters,
        })
    }

    /// Replace the network with another source (recorded fixtures in tests).
    pub fn with_source(mut self, source: Box<dyn JsonSource>) -> Self {
        self.source = source;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<ScanSummary> {
        self.run_at(Utc::now()).await
    }

    /// Run every adapter in sequence, render the digest and write both copies.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ScanSummary> {
        let ctx = AdapterContext::new(now);
        let span = info_span!("scan_run", run_id = %ctx.run_id);
        async move {
            let started_at = Utc::now();
            let mut sections = Vec::with_capacity(self.adapters.len());
            for adapter in &self.adapters {
                let items = adapter
                    .scan(self.source.as_ref(), &ctx)
                    .await
                    .with_context(|| format!("scanning {}", adapter.source_name()))?;
                info!(source = adapter.source_name(), count = items.len(), "source scanned");
                sections.push(DigestSection {
                    kind: adapter.kind(),
                    name: adapter.section_name(),
                    items,
                });
            }

            let generated_at = now.with_timezone(&Local).naive_local();
            let input = DigestInput {
                generated_at,
                site_url: self.profile.site_url.clone(),
                manual: manual_search_links(&self.profile.manual_platforms),
                sections,
            };
            let markdown = render_digest(&input, &self.profile.classifier());

            let report_path = self.config.dated_path(generated_at.date());
            let latest_path = self.config.latest_path();
            write_atomic(&report_path, markdown.as_bytes())
                .await
                .with_context(|| format!("writing {}", report_path.display()))?;
            write_atomic(&latest_path, markdown.as_bytes())
                .await
                .with_context(|| format!("writing {}", latest_path.display()))?;

            let sources = input
                .sections
                .iter()
                .map(|s| SourceCount {
                    name: s.name.clone(),
                    kind: s.kind,
                    count: s.items.len(),
                })
                .collect();

            Ok(ScanSummary {
                run_id: ctx.run_id,
                started_at,
                finished_at: Utc::now(),
                sources,
                total: input.total(),
                manual_platforms: input.manual.len(),
                report_path: report_path.display().to_string(),
                latest_path: latest_path.display().to_string(),
            })
        }
        .instrument(span)
        .await
    }

    /// One cheap request per automated source. Never fails.
    pub async fn connectivity_check(&self) -> Vec<ReachabilityCheck> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let url = adapter.check_url();
            let error = match self.source.fetch_json(&url).await {
                Ok(_) => None,
                Err(err) => {
                    warn!(source = adapter.source_name(), error = %err, "connectivity check failed");
                    Some(err.to_string())
                }
            };
            results.push(ReachabilityCheck {
                name: adapter.source_name().to_string(),
                url,
                error,
            });
        }
        results
    }
}

/// Raw text of the latest digest, or `None` before the first scan.
pub async fn read_latest_digest(config: &ScanConfig) -> Result<Option<String>> {
    let path = config.latest_path();
    match fs::read_to_string(&path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Latest digest parsed and joined with the completion store.
pub async fn load_digest_view(config: &ScanConfig) -> Result<DigestView> {
    let Some(text) = read_latest_digest(config).await? else {
        return Ok(DigestView::default());
    };
    let done = config.completion_store().load().await;
    Ok(parse_digest(&text, &done))
}
