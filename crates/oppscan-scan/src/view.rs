//! Parsed view of a rendered digest, joined with the completion set.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use oppscan_core::{stable_id, truncate_chars};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::digest::{DIGEST_TITLE, MANUAL_SECTION_NAME, RULES_SECTION_NAME};

const SNIPPET_VIEW_CHARS: usize = 120;

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^##\s+(.+?)(?:\s*\((\d+)\s+\w+\))?\s*$").expect("section header regex")
});
static DIGEST_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Opportunity Digest — (.+)").expect("digest date regex"));
static FORUM_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*r/(\w+)\*\*\s*\|\s*(\d+)\s*comments").expect("forum meta regex")
});
static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^- \[(.+?)\]\((.+?)\)").expect("markdown link regex"));
static ITEM_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("item number regex"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: String,
    pub title: String,
    pub link: String,
    pub category: String,
    pub comments: String,
    pub snippet: String,
    pub angle: String,
    pub relevant_page: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkView {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformView {
    pub name: String,
    pub links: Vec<LinkView>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionView {
    Opportunities {
        name: String,
        count: usize,
        done_count: usize,
        items: Vec<ItemView>,
    },
    Empty {
        name: String,
    },
    Manual {
        name: String,
        platforms: Vec<PlatformView>,
    },
    Rules {
        name: String,
        rules: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestView {
    pub date: String,
    pub sections: Vec<SectionView>,
    pub total: usize,
    pub total_done: usize,
}

impl DigestView {
    /// `(section, done, listed)` for every opportunity-bearing section.
    pub fn progress(&self) -> Vec<(&str, usize, usize)> {
        self.sections
            .iter()
            .filter_map(|section| match section {
                SectionView::Opportunities {
                    name,
                    count,
                    done_count,
                    ..
                } => Some((name.as_str(), *done_count, *count)),
                SectionView::Empty { name } => Some((name.as_str(), 0, 0)),
                _ => None,
            })
            .collect()
    }
}

pub fn parse_digest(text: &str, done: &BTreeSet<String>) -> DigestView {
    let date = DIGEST_DATE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let mut sections = Vec::new();
    for part in split_sections(text) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some(header) = part.lines().find_map(|line| SECTION_HEADER.captures(line)) else {
            continue;
        };
        let name = header[1].trim().to_string();
        let declared = header
            .get(2)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(0);
        if name.starts_with(DIGEST_TITLE) {
            continue;
        }

        if name.contains(MANUAL_SECTION_NAME) {
            sections.push(SectionView::Manual {
                platforms: parse_platforms(part),
                name,
            });
        } else if name.contains(RULES_SECTION_NAME) {
            sections.push(SectionView::Rules {
                rules: parse_rules(part),
                name,
            });
        } else {
            let items = parse_items(&name, part, done);
            if items.is_empty() && declared == 0 {
                sections.push(SectionView::Empty { name });
            } else {
                let done_count = items.iter().filter(|i| i.done).count();
                sections.push(SectionView::Opportunities {
                    count: items.len(),
                    done_count,
                    items,
                    name,
                });
            }
        }
    }

    let (total, total_done) = sections.iter().fold((0, 0), |(t, d), section| match section {
        SectionView::Opportunities {
            count, done_count, ..
        } => (t + count, d + done_count),
        _ => (t, d),
    });

    DigestView {
        date,
        sections,
        total,
        total_done,
    }
}

fn split_sections(text: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    for line in text.lines() {
        if line.trim_end() == "---" {
            parts.push(String::new());
            continue;
        }
        if let Some(current) = parts.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    parts
}

fn sub_blocks(part: &str) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in part.lines() {
        let line = line.trim();
        if let Some(heading) = line.strip_prefix("### ") {
            blocks.push(vec![heading.trim()]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }
    blocks
}

fn parse_items(section_name: &str, part: &str, done: &BTreeSet<String>) -> Vec<ItemView> {
    let mut items = Vec::new();
    for block in sub_blocks(part) {
        let Some((heading, body)) = block.split_first() else {
            continue;
        };
        let title = ITEM_NUMBER.replace(heading, "").to_string();
        if title.is_empty() {
            continue;
        }

        let mut item = ItemView {
            id: stable_id(section_name, &title),
            title,
            ..Default::default()
        };
        for line in body {
            if let Some(link) = line.strip_prefix("Link:") {
                item.link = link.trim().to_string();
            } else if let Some(caps) = FORUM_META.captures(line) {
                item.category = format!("r/{}", &caps[1]);
                item.comments = caps[2].to_string();
            } else if let Some(angle) = line.strip_prefix("**Suggested angle**:") {
                item.angle = angle.trim().to_string();
            } else if let Some(page) = line.strip_prefix("**Relevant page**:") {
                item.relevant_page = page.trim().to_string();
            } else if let Some(snippet) = line.strip_prefix("> _") {
                let snippet = snippet.trim_end_matches('_').trim();
                item.snippet = truncate_chars(snippet, SNIPPET_VIEW_CHARS);
            } else if let Some(tags) = line.strip_prefix("Tags:") {
                item.category = tags.trim().to_string();
            } else if line.starts_with("story |") || line.starts_with("comment |") {
                if let Some(count) = line
                    .split('|')
                    .nth(2)
                    .and_then(|field| field.split_whitespace().next())
                {
                    item.comments = count.to_string();
                }
            }
        }
        item.done = done.contains(&item.id);
        items.push(item);
    }
    items
}

fn parse_platforms(part: &str) -> Vec<PlatformView> {
    sub_blocks(part)
        .into_iter()
        .filter_map(|block| {
            let (name, body) = block.split_first()?;
            let mut platform = PlatformView {
                name: name.to_string(),
                links: Vec::new(),
                note: String::new(),
            };
            for line in body {
                if let Some(caps) = MARKDOWN_LINK.captures(line) {
                    platform.links.push(LinkView {
                        label: caps[1].to_string(),
                        url: caps[2].to_string(),
                    });
                } else if line.len() > 1 && line.starts_with('_') && line.ends_with('_') {
                    platform.note = line.trim_matches('_').trim().to_string();
                }
            }
            Some(platform)
        })
        .collect()
}

fn parse_rules(part: &str) -> Vec<String> {
    part.lines()
        .map(str::trim)
        .filter(|line| ITEM_NUMBER.is_match(line))
        .map(|line| BOLD.replace_all(line, "$1").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Opportunity Digest — 2026-10-19 08:00

Found **2** opportunities across automated scans,

---
## Reddit (2 posts)

### 1. Is eToro safe?
**r/etoro** | 1 comments **← FEW REPLIES** | score 4 | 2026-10-18 09:00
Link: https://reddit.com/r/etoro/comments/a1/
> _I have been thinking about it..._
**Suggested angle**: Share your experience
**Relevant page**: https://socialtradingvlog.com/etoro-review/

### 2. Copy trading fees
**r/investing** | 12 comments | score 9 | 2026-10-18 10:00
Link: https://reddit.com/r/investing/comments/b2/
**Suggested angle**: Break down costs
**Relevant page**: https://socialtradingvlog.com/etoro-review/

---
## Hacker News (0 mentions)

_None this scan._

---
## Manual Checks (1 platforms)

### Trustpilot (eToro reviews)
_Reply to recent reviews_
- [etoro](https://www.google.com/search?q=site%3Atrustpilot.com%20etoro&tbs=qdr:m)

---
## Engagement Rules

1. **Answer the question first** be helpful
2. **Link at the end**
";

    #[test]
    fn parses_sections_items_and_date() {
        let view = parse_digest(SAMPLE, &BTreeSet::new());
        assert_eq!(view.date, "2026-10-19 08:00");
        assert_eq!(view.sections.len(), 4);
        assert_eq!(view.total, 2);

        let SectionView::Opportunities { name, items, .. } = &view.sections[0] else {
            panic!("expected opportunities, got {:?}", view.sections[0]);
        };
        assert_eq!(name, "Reddit");
        assert_eq!(items[0].title, "Is eToro safe?");
        assert_eq!(items[0].id, "redditisetorosafe");
        assert_eq!(items[0].category, "r/etoro");
        assert_eq!(items[0].comments, "1");
        assert_eq!(items[0].snippet, "I have been thinking about it...");
        assert_eq!(items[1].link, "https://reddit.com/r/investing/comments/b2/");
        assert_eq!(items[1].relevant_page, "https://socialtradingvlog.com/etoro-review/");
    }

    #[test]
    fn empty_sections_are_kept() {
        let view = parse_digest(SAMPLE, &BTreeSet::new());
        assert_eq!(
            view.sections[1],
            SectionView::Empty {
                name: "Hacker News".to_string()
            }
        );
    }

    #[test]
    fn manual_and_rules_sections_are_structured() {
        let view = parse_digest(SAMPLE, &BTreeSet::new());
        let SectionView::Manual { platforms, .. } = &view.sections[2] else {
            panic!("expected manual section");
        };
        assert_eq!(platforms[0].name, "Trustpilot (eToro reviews)");
        assert_eq!(platforms[0].note, "Reply to recent reviews");
        assert_eq!(platforms[0].links[0].label, "etoro");

        let SectionView::Rules { rules, .. } = &view.sections[3] else {
            panic!("expected rules section");
        };
        assert_eq!(rules[0], "1. Answer the question first be helpful");
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn done_flags_come_from_the_completion_set() {
        let done = ["redditisetorosafe".to_string(), "unrelated".to_string()]
            .into_iter()
            .collect();
        let view = parse_digest(SAMPLE, &done);
        assert_eq!(view.total_done, 1);
        assert_eq!(view.progress()[0], ("Reddit", 1, 2));
        assert_eq!(view.progress()[1], ("Hacker News", 0, 0));
    }
}
