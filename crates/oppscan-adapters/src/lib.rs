//! Source adapter contracts and the per-platform adapters.
//!
//! Every adapter walks its keyword list one query at a time, sleeps between
//! queries, normalises raw items into [`Opportunity`] records, filters them
//! for relevance, dedups on the platform's native id and returns the survivors
//! sorted by opportunity score.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use oppscan_core::{
    collapse_whitespace, sort_by_score_desc, truncate_chars, Engagement, NewsItemKind,
    Opportunity, SourceDetail, SourceKind,
};
use oppscan_storage::JsonSource;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "oppscan-adapters";

pub const CORE_KEYWORDS: &[&str] = &["etoro", "copy trading", "social trading"];

pub const EXTENDED_KEYWORDS: &[&str] = &[
    "etoro review",
    "etoro scam",
    "is etoro safe",
    "etoro fees",
    "etoro copy",
    "copy trading beginners",
    "copy trading profit",
    "copy trading risk",
    "copy trader",
    "who to copy on etoro",
    "etoro popular investor",
    "etoro withdraw",
    "etoro vs",
];

const SNIPPET_MAX_CHARS: usize = 200;
const NEWS_COMMENT_TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            now,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid query url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Short label stored on each record ("Reddit", "Money-QA", "TechNews").
    fn source_name(&self) -> &str;

    /// Digest section heading, without the item count.
    fn section_name(&self) -> String;

    /// Cheap endpoint used by the connectivity self-test.
    fn check_url(&self) -> String;

    async fn scan(
        &self,
        source: &dyn JsonSource,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError>;
}

/// Shape shared by the keyword-search adapters; [`scan_keywords`] drives it.
pub trait KeywordSearch: Send + Sync {
    fn keywords(&self) -> &[String];
    fn throttle(&self) -> Duration;
    fn query_url(&self, keyword: &str) -> Result<String, AdapterError>;
    /// Raw items inside a decoded search payload.
    fn raw_items<'a>(&self, payload: &'a JsonValue) -> Vec<&'a JsonValue>;
    /// Normalise one raw item; `None` drops it (off-topic, too old, malformed).
    fn normalise(&self, raw: &JsonValue, keyword: &str, ctx: &AdapterContext) -> Option<Opportunity>;
}

pub async fn scan_keywords<A: KeywordSearch + ?Sized>(
    adapter: &A,
    source: &dyn JsonSource,
    ctx: &AdapterContext,
) -> Result<Vec<Opportunity>, AdapterError> {
    let mut results = Vec::new();
    let mut seen_ids = HashSet::new();

    for (index, keyword) in adapter.keywords().iter().enumerate() {
        if index > 0 && !adapter.throttle().is_zero() {
            tokio::time::sleep(adapter.throttle()).await;
        }

        let url = adapter.query_url(keyword)?;
        let payload = match source.fetch_json(&url).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(run_id = %ctx.run_id, keyword = %keyword, error = %err, "query failed; skipping");
                continue;
            }
        };

        let mut accepted = 0usize;
        for raw in adapter.raw_items(&payload) {
            let Some(opportunity) = adapter.normalise(raw, keyword, ctx) else {
                continue;
            };
            if !seen_ids.insert(opportunity.native_id.clone()) {
                continue;
            }
            accepted += 1;
            results.push(opportunity);
        }
        debug!(keyword = %keyword, accepted, "query processed");
    }

    sort_by_score_desc(&mut results);
    Ok(results)
}


/// Decode HTML entities in plain text (`AT&amp;T` -> `AT&T`).
///
/// Text that merely looks like markup (`Is <eToro> worth it`) is kept as-is.
pub fn decode_html_entities(text: &str) -> String {
    collapse_whitespace(&html_escape::decode_html_entities(text))
}

/// Drop markup and decode entities, keeping a space between text nodes.
pub fn strip_html(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    collapse_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

fn validated_url(candidate: String) -> Result<String, AdapterError> {
    Url::parse(&candidate)
        .map(|_| candidate.clone())
        .map_err(|source| AdapterError::InvalidUrl {
            url: candidate,
            source,
        })
}

fn is_absolute_url(candidate: &str) -> bool {
    Url::parse(candidate).map(|u| u.has_host()).unwrap_or(false)
}

fn json_str<'a>(value: &'a JsonValue, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str()
}

fn json_u64(value: &JsonValue, key: &str) -> u64 {
    value
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}

fn json_i64(value: &JsonValue, key: &str) -> i64 {
    value
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn json_timestamp(value: &JsonValue, key: &str) -> Option<DateTime<Utc>> {
    let secs = value
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))?;
    DateTime::from_timestamp(secs, 0)
}

fn snippet_from(text: &str) -> Option<String> {
    let snippet = truncate_chars(text.trim(), SNIPPET_MAX_CHARS);
    if snippet.is_empty() {
        None
    } else {
        Some(snippet)
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub endpoint: String,
    pub keywords: Vec<String>,
    pub primary_communities: Vec<String>,
    pub secondary_communities: Vec<String>,
    /// Title substrings that make a post relevant wherever it was posted.
    pub title_keywords: Vec<String>,
    pub throttle_ms: u64,
    pub page_size: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        let mut keywords = owned(CORE_KEYWORDS);
        keywords.extend(owned(&EXTENDED_KEYWORDS[..5]));
        Self {
            endpoint: "https://www.reddit.com".to_string(),
            keywords,
            primary_communities: owned(&["etoro", "copytrading", "UKInvesting", "eupersonalfinance"]),
            secondary_communities: owned(&[
                "investing",
                "stocks",
                "personalfinance",
                "trading",
                "Daytrading",
                "Forex",
                "UKPersonalFinance",
                "AusFinance",
                "CanadianInvestor",
                "dividends",
            ]),
            title_keywords: owned(&["etoro", "copy trad", "social trad"]),
            throttle_ms: 1500,
            page_size: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditAdapter {
    config: RedditConfig,
}

impl RedditAdapter {
    pub fn new(config: RedditConfig) -> Self {
        Self { config }
    }

    fn in_list(list: &[String], community: &str) -> bool {
        list.iter().any(|c| c.eq_ignore_ascii_case(community))
    }
}

impl KeywordSearch for RedditAdapter {
    fn keywords(&self) -> &[String] {
        &self.config.keywords
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(self.config.throttle_ms)
    }

    fn query_url(&self, keyword: &str) -> Result<String, AdapterError> {
        validated_url(format!(
            "{}/search.json?q={}&sort=new&t=week&limit={}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(keyword),
            self.config.page_size
        ))
    }

    fn raw_items<'a>(&self, payload: &'a JsonValue) -> Vec<&'a JsonValue> {
        payload
            .pointer("/data/children")
            .and_then(|c| c.as_array())
            .map(|children| children.iter().filter_map(|c| c.get("data")).collect())
            .unwrap_or_default()
    }

    fn normalise(&self, post: &JsonValue, keyword: &str, _ctx: &AdapterContext) -> Option<Opportunity> {
        let id = json_str(post, "id")?;
        let title = decode_html_entities(json_str(post, "title").unwrap_or_default());
        if title.is_empty() {
            return None;
        }

        let community = json_str(post, "subreddit").unwrap_or_default();
        let in_primary = Self::in_list(&self.config.primary_communities, community);
        let in_secondary = Self::in_list(&self.config.secondary_communities, community);
        let title_relevant = contains_any(&title.to_lowercase(), &self.config.title_keywords);
        if !(in_primary || in_secondary || title_relevant) {
            return None;
        }

        let permalink = json_str(post, "permalink").unwrap_or_default();
        let url = format!("https://reddit.com{permalink}");
        if !permalink.starts_with('/') || !is_absolute_url(&url) {
            return None;
        }

        let comments = json_u64(post, "num_comments");
        let score = json_i64(post, "score");

        let mut opportunity_score = 0;
        if in_primary {
            opportunity_score += 5;
        }
        if comments < 3 {
            opportunity_score += 5;
        } else if comments < 10 {
            opportunity_score += 2;
        }
        if title_relevant {
            opportunity_score += 3;
        }
        if score > 5 {
            opportunity_score += 1;
        }

        Some(Opportunity {
            source_name: "Reddit".to_string(),
            native_id: id.to_string(),
            title,
            url,
            created_at: json_timestamp(post, "created_utc")
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            engagement: Engagement {
                comments,
                score,
                ..Default::default()
            },
            detail: SourceDetail::SocialForum {
                community: community.to_string(),
            },
            matched_keyword: keyword.to_string(),
            snippet: snippet_from(&decode_html_entities(
                json_str(post, "selftext").unwrap_or_default(),
            )),
            opportunity_score,
        })
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::SocialForum
    }

    fn source_name(&self) -> &str {
        "Reddit"
    }

    fn section_name(&self) -> String {
        "Reddit".to_string()
    }

    fn check_url(&self) -> String {
        format!(
            "{}/r/etoro/new.json?limit=1",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    async fn scan(
        &self,
        source: &dyn JsonSource,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        let results = scan_keywords(self, source, ctx).await?;
        info!(run_id = %ctx.run_id, count = results.len(), "reddit scan complete");
        Ok(results)
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackExchangeConfig {
    pub endpoint: String,
    /// API site parameter, e.g. `money`.
    pub site: String,
    /// Human name used in the section heading, e.g. `Money`.
    pub site_label: String,
    pub keywords: Vec<String>,
    pub max_age_days: i64,
    pub throttle_ms: u64,
    pub page_size: u32,
}

impl Default for StackExchangeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.stackexchange.com/2.3".to_string(),
            site: "money".to_string(),
            site_label: "Money".to_string(),
            keywords: owned(&["etoro", "copy trading", "social trading", "copy trader", "copytrading"]),
            max_age_days: 60,
            throttle_ms: 500,
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackExchangeAdapter {
    config: StackExchangeConfig,
    source_name: String,
}

impl StackExchangeAdapter {
    pub fn new(config: StackExchangeConfig) -> Self {
        let source_name = format!("{}-QA", config.site_label);
        Self { config, source_name }
    }
}

impl KeywordSearch for StackExchangeAdapter {
    fn keywords(&self) -> &[String] {
        &self.config.keywords
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(self.config.throttle_ms)
    }

    fn query_url(&self, keyword: &str) -> Result<String, AdapterError> {
        validated_url(format!(
            "{}/search/advanced?order=desc&sort=creation&q={}&site={}&filter=default&pagesize={}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(keyword),
            urlencoding::encode(&self.config.site),
            self.config.page_size
        ))
    }

    fn raw_items<'a>(&self, payload: &'a JsonValue) -> Vec<&'a JsonValue> {
        payload
            .get("items")
            .and_then(|i| i.as_array())
            .map(|items| items.iter().collect())
            .unwrap_or_default()
    }

    fn normalise(&self, question: &JsonValue, keyword: &str, ctx: &AdapterContext) -> Option<Opportunity> {
        let id = question.get("question_id")?.as_u64()?;
        let created = json_timestamp(question, "creation_date").unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if (ctx.now - created).num_days() > self.config.max_age_days {
            return None;
        }

        let title = decode_html_entities(json_str(question, "title").unwrap_or_default());
        let url = json_str(question, "link").unwrap_or_default().to_string();
        if title.is_empty() || !is_absolute_url(&url) {
            return None;
        }

        let answers = json_u64(question, "answer_count");
        let is_answered = question
            .get("is_answered")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut opportunity_score = 0;
        if !is_answered {
            opportunity_score += 5;
        }
        if answers == 0 {
            opportunity_score += 5;
        } else if answers < 3 {
            opportunity_score += 2;
        }

        let tags = question
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Some(Opportunity {
            source_name: self.source_name.clone(),
            native_id: id.to_string(),
            title,
            url,
            created_at: created.format("%Y-%m-%d").to_string(),
            engagement: Engagement {
                answers,
                score: json_i64(question, "score"),
                views: json_u64(question, "view_count"),
                ..Default::default()
            },
            detail: SourceDetail::QaSite { tags, is_answered },
            matched_keyword: keyword.to_string(),
            snippet: None,
            opportunity_score,
        })
    }
}

#[async_trait]
impl SourceAdapter for StackExchangeAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::QaSite
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn section_name(&self) -> String {
        format!("Stack Exchange — {}", self.config.site_label)
    }

    fn check_url(&self) -> String {
        format!(
            "{}/info?site={}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.site)
        )
    }

    async fn scan(
        &self,
        source: &dyn JsonSource,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        let results = scan_keywords(self, source, ctx).await?;
        info!(run_id = %ctx.run_id, site = %self.config.site, count = results.len(), "stack exchange scan complete");
        Ok(results)
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HackerNewsConfig {
    pub endpoint: String,
    pub keywords: Vec<String>,
    /// Keywords that must literally appear in the item text; the search
    /// backend also matches near-misses such as "Toronto" for "etoro".
    pub brand_keywords: Vec<String>,
    pub max_age_days: i64,
    pub throttle_ms: u64,
    pub page_size: u32,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://hn.algolia.com/api/v1".to_string(),
            keywords: owned(&["etoro", "copy trading", "social trading", "copytrading"]),
            brand_keywords: owned(&["etoro"]),
            max_age_days: 30,
            throttle_ms: 500,
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HackerNewsAdapter {
    config: HackerNewsConfig,
}

impl HackerNewsAdapter {
    pub fn new(config: HackerNewsConfig) -> Self {
        Self { config }
    }
}

impl KeywordSearch for HackerNewsAdapter {
    fn keywords(&self) -> &[String] {
        &self.config.keywords
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(self.config.throttle_ms)
    }

    fn query_url(&self, keyword: &str) -> Result<String, AdapterError> {
        validated_url(format!(
            "{}/search_by_date?query={}&tags=(story,comment)&hitsPerPage={}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(keyword),
            self.config.page_size
        ))
    }

    fn raw_items<'a>(&self, payload: &'a JsonValue) -> Vec<&'a JsonValue> {
        payload
            .get("hits")
            .and_then(|h| h.as_array())
            .map(|hits| hits.iter().collect())
            .unwrap_or_default()
    }

    fn normalise(&self, hit: &JsonValue, keyword: &str, ctx: &AdapterContext) -> Option<Opportunity> {
        let id = json_str(hit, "objectID").filter(|id| !id.is_empty())?;

        let created: String = json_str(hit, "created_at").unwrap_or_default().chars().take(10).collect();
        let created_date = NaiveDate::parse_from_str(&created, "%Y-%m-%d").ok()?;
        if (ctx.now.date_naive() - created_date).num_days() > self.config.max_age_days {
            return None;
        }

        let raw_title = json_str(hit, "title").unwrap_or_default();
        let comment_text = json_str(hit, "comment_text").unwrap_or_default();
        let story_text = json_str(hit, "story_text").unwrap_or_default();

        let full_text = format!("{raw_title} {story_text} {comment_text}").to_lowercase();
        let keyword_lower = keyword.to_lowercase();
        let is_brand = self
            .config
            .brand_keywords
            .iter()
            .any(|b| b.to_lowercase() == keyword_lower);
        if is_brand && !full_text.contains(&keyword_lower) {
            return None;
        }

        let title = if comment_text.is_empty() {
            decode_html_entities(raw_title)
        } else {
            truncate_chars(&strip_html(comment_text), NEWS_COMMENT_TITLE_CHARS)
        };
        if title.is_empty() {
            return None;
        }

        let item_kind = if raw_title.is_empty() {
            NewsItemKind::Comment
        } else {
            NewsItemKind::Story
        };
        let points = json_u64(hit, "points");

        Some(Opportunity {
            source_name: "TechNews".to_string(),
            native_id: id.to_string(),
            title,
            url: format!("https://news.ycombinator.com/item?id={}", urlencoding::encode(id)),
            created_at: created,
            engagement: Engagement {
                comments: json_u64(hit, "num_comments"),
                points,
                ..Default::default()
            },
            detail: SourceDetail::TechNews { item_kind },
            matched_keyword: keyword.to_string(),
            snippet: snippet_from(&strip_html(story_text)),
            opportunity_score: points,
        })
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::TechNews
    }

    fn source_name(&self) -> &str {
        "TechNews"
    }

    fn section_name(&self) -> String {
        "Hacker News".to_string()
    }

    fn check_url(&self) -> String {
        format!(
            "{}/search?query=test&hitsPerPage=1",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    async fn scan(
        &self,
        source: &dyn JsonSource,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        let results = scan_keywords(self, source, ctx).await?;
        info!(run_id = %ctx.run_id, count = results.len(), "hacker news scan complete");
        Ok(results)
    }
}


/// A platform without a free API, searched through a site-scoped web query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualPlatform {
    pub name: String,
    pub site: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ManualPlatform {
    fn new(name: &str, site: &str, keywords: &[&str], note: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            site: site.to_string(),
            keywords: owned(keywords),
            note: note.map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLink {
    pub keyword: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPlatformLinks {
    pub platform: String,
    pub links: Vec<ManualLink>,
    pub note: Option<String>,
}

pub fn default_manual_platforms() -> Vec<ManualPlatform> {
    let common = ["etoro", "copy trading", "social trading"];
    vec![
        ManualPlatform::new(
            "Quora",
            "quora.com",
            &[
                "etoro",
                "copy trading worth it",
                "is etoro safe",
                "etoro scam or legit",
                "copy trading beginners",
                "copy trading risk",
                "is copy trading profitable",
            ],
            None,
        ),
        ManualPlatform::new("BabyPips Forum", "forums.babypips.com", &common, None),
        ManualPlatform::new("Trade2Win", "trade2win.com", &common, None),
        ManualPlatform::new("Forex Factory", "forexfactory.com", &["etoro", "copy trading"], None),
        ManualPlatform::new(
            "Trustpilot (eToro reviews)",
            "trustpilot.com",
            &["etoro"],
            Some("Reply to recent eToro reviews with your genuine experience"),
        ),
        ManualPlatform::new(
            "Medium",
            "medium.com",
            &["etoro copy trading", "social trading review", "copy trading results"],
            Some("Consider writing a Medium article with your real results, these rank well"),
        ),
        ManualPlatform::new("Elite Trader Forum", "elitetrader.com", &common, None),
        ManualPlatform::new(
            "MoneySavingExpert Forum",
            "forums.moneysavingexpert.com",
            &common,
            None,
        ),
    ]
}

/// Search-engine query restricted to `site` and to the past month.
pub fn manual_search_url(site: &str, keyword: &str) -> String {
    let query = format!("site:{site} {keyword}");
    format!(
        "https://www.google.com/search?q={}&tbs=qdr:m",
        urlencoding::encode(&query)
    )
}

/// Pure, order-preserving: one entry per configured platform.
pub fn manual_search_links(platforms: &[ManualPlatform]) -> Vec<ManualPlatformLinks> {
    platforms
        .iter()
        .map(|platform| ManualPlatformLinks {
            platform: platform.name.clone(),
            links: platform
                .keywords
                .iter()
                .map(|keyword| ManualLink {
                    keyword: keyword.clone(),
                    url: manual_search_url(&platform.site, keyword),
                })
                .collect(),
            note: platform.note.clone().filter(|n| !n.trim().is_empty()),
        })
        .collect()
}
