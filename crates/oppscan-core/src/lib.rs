//! Core domain model for the opportunity scanner.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "oppscan-core";

/// Rendered item titles are cut to this many characters; the stable id is
/// derived from the cut title so the digest and its parsed view agree.
pub const TITLE_DISPLAY_CHARS: usize = 90;

pub const STABLE_ID_MAX_CHARS: usize = 60;

/// Kind of platform an opportunity (or a digest section) comes from.
///
/// Declaration order is the digest section order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SocialForum,
    QaSite,
    TechNews,
    Manual,
}

impl SourceKind {
    /// Plural noun used in section headers, e.g. `## Reddit (3 posts)`.
    pub fn item_noun(self) -> &'static str {
        match self {
            SourceKind::SocialForum => "posts",
            SourceKind::QaSite => "questions",
            SourceKind::TechNews => "mentions",
            SourceKind::Manual => "platforms",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsItemKind {
    Story,
    Comment,
}

impl NewsItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NewsItemKind::Story => "story",
            NewsItemKind::Comment => "comment",
        }
    }
}

/// Source-specific facts that do not fit the uniform engagement bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDetail {
    SocialForum { community: String },
    QaSite { tags: Vec<String>, is_answered: bool },
    TechNews { item_kind: NewsItemKind },
}

impl SourceDetail {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDetail::SocialForum { .. } => SourceKind::SocialForum,
            SourceDetail::QaSite { .. } => SourceKind::QaSite,
            SourceDetail::TechNews { .. } => SourceKind::TechNews,
        }
    }
}

/// Engagement counters; sources fill the ones they report and leave the rest at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub comments: u64,
    pub answers: u64,
    pub score: i64,
    pub points: u64,
    pub views: u64,
}

/// Normalised record every adapter produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub source_name: String,
    /// Id assigned by the upstream platform; unique within one adapter run.
    pub native_id: String,
    pub title: String,
    pub url: String,
    pub created_at: String,
    pub engagement: Engagement,
    pub detail: SourceDetail,
    pub matched_keyword: String,
    pub snippet: Option<String>,
    pub opportunity_score: u64,
}

impl Opportunity {
    pub fn kind(&self) -> SourceKind {
        self.detail.kind()
    }

    /// Category label shown in the digest (`r/etoro`, `investing, etoro`).
    pub fn subcategory(&self) -> Option<String> {
        match &self.detail {
            SourceDetail::SocialForum { community } => Some(format!("r/{community}")),
            SourceDetail::QaSite { tags, .. } if !tags.is_empty() => Some(tags.join(", ")),
            _ => None,
        }
    }

    pub fn display_title(&self) -> String {
        truncate_chars(&self.title, TITLE_DISPLAY_CHARS)
    }

    pub fn stable_id_in(&self, section_name: &str) -> String {
        stable_id(section_name, &self.display_title())
    }
}

/// `lowercase_alnum_only(section_name + title)`, cut to 60 characters.
///
/// Only ASCII letters and digits survive, so punctuation, whitespace and
/// non-ASCII drift between runs do not change the id.
pub fn stable_id(section_name: &str, title: &str) -> String {
    section_name
        .chars()
        .chain(title.chars())
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(STABLE_ID_MAX_CHARS)
        .collect()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable descending sort by opportunity score; ties keep arrival order.
pub fn sort_by_score_desc(items: &mut [Opportunity]) {
    items.sort_by(|a, b| b.opportunity_score.cmp(&a.opportunity_score));
}
