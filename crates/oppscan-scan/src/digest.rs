//! Markdown digest rendering.
//!
//! The layout is a contract with [`crate::view::parse_digest`]: sections are
//! separated by `---` lines, section headers read `## <Name> (<N> <noun>)`,
//! items are `### ` headings, and empty sections keep their header plus
//! [`EMPTY_SECTION_LINE`].

use chrono::NaiveDateTime;
use oppscan_adapters::ManualPlatformLinks;
use oppscan_core::{truncate_chars, Opportunity, SourceDetail, SourceKind};

use crate::angle::AngleClassifier;

pub const DIGEST_TITLE: &str = "Opportunity Digest";
pub const EMPTY_SECTION_LINE: &str = "_None this scan._";
pub const FEW_REPLIES_BADGE: &str = " **← FEW REPLIES**";
pub const MANUAL_SECTION_NAME: &str = "Manual Checks";
pub const RULES_SECTION_NAME: &str = "Engagement Rules";

const SNIPPET_DISPLAY_CHARS: usize = 150;
const FEW_REPLIES_BELOW: u64 = 3;

pub const ENGAGEMENT_RULES: &[&str] = &[
    "**Answer the question first** — be genuinely helpful",
    "**Mention experience naturally** — \"I've been copy trading on eToro for 6 years...\"",
    "**Link at the end** — \"I wrote about this in more detail here: [link]\"",
    "**Reddit**: Keep to 90/10 ratio (genuine comments vs self-promo)",
    "**Stack Exchange**: Must be factual, well-sourced answers",
    "**Quora**: Personal experience format works best",
    "**Never copy-paste** the same answer twice — customise for each question",
];

#[derive(Debug, Clone)]
pub struct DigestSection {
    pub kind: SourceKind,
    pub name: String,
    pub items: Vec<Opportunity>,
}

#[derive(Debug, Clone)]
pub struct DigestInput {
    /// Local wall-clock time of the run; the only clock value in the output.
    pub generated_at: NaiveDateTime,
    pub site_url: String,
    pub sections: Vec<DigestSection>,
    pub manual: Vec<ManualPlatformLinks>,
}

impl DigestInput {
    pub fn total(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }
}

/// Maximum number of items listed per section; the header still shows the full count.
pub fn display_cap(kind: SourceKind) -> usize {
    match kind {
        SourceKind::SocialForum => 15,
        SourceKind::QaSite | SourceKind::TechNews => 10,
        SourceKind::Manual => usize::MAX,
    }
}

pub fn render_digest(input: &DigestInput, angles: &AngleClassifier) -> String {
    let mut lines = vec![
        format!(
            "# {DIGEST_TITLE} — {}",
            input.generated_at.format("%Y-%m-%d %H:%M")
        ),
        String::new(),
        format!(
            "Found **{}** opportunities across automated scans,",
            input.total()
        ),
        format!(
            "plus manual search links for {} additional platforms.",
            input.manual.len()
        ),
        String::new(),
        "**How to use this**: Pick 1-2 best opportunities per day. Write a genuinely".to_string(),
        "helpful reply, mention your experience naturally, and include a relevant link".to_string(),
        format!("to {} at the end. Quality over quantity.", input.site_url),
        String::new(),
        "_Items you have not marked done are listed again on every scan while they stay inside the source's search window._"
            .to_string(),
        String::new(),
    ];

    let mut sections = input
        .sections
        .iter()
        .filter(|s| s.kind != SourceKind::Manual)
        .collect::<Vec<_>>();
    sections.sort_by_key(|s| s.kind);

    for section in sections {
        render_source_section(&mut lines, section, angles);
    }
    render_manual_section(&mut lines, &input.manual);
    render_rules_section(&mut lines);

    lines.join("\n")
}

fn render_source_section(lines: &mut Vec<String>, section: &DigestSection, angles: &AngleClassifier) {
    lines.push("---".to_string());
    lines.push(format!(
        "## {} ({} {})",
        section.name,
        section.items.len(),
        section.kind.item_noun()
    ));
    lines.push(String::new());

    if section.items.is_empty() {
        lines.push(EMPTY_SECTION_LINE.to_string());
        lines.push(String::new());
        return;
    }

    for (index, item) in section
        .items
        .iter()
        .take(display_cap(section.kind))
        .enumerate()
    {
        let angle = angles.classify(&item.title);
        lines.push(format!("### {}. {}", index + 1, item.display_title()));
        lines.extend(metadata_lines(item));
        lines.push(format!("Link: {}", item.url));
        if let Some(snippet) = &item.snippet {
            lines.push(format!(
                "> _{}..._",
                truncate_chars(snippet, SNIPPET_DISPLAY_CHARS)
            ));
        }
        lines.push(format!("**Suggested angle**: {}", angle.text));
        lines.push(format!("**Relevant page**: {}", angle.url));
        lines.push(String::new());
    }
}

fn metadata_lines(item: &Opportunity) -> Vec<String> {
    let e = &item.engagement;
    match &item.detail {
        SourceDetail::SocialForum { .. } => {
            let badge = if e.comments < FEW_REPLIES_BELOW {
                FEW_REPLIES_BADGE
            } else {
                ""
            };
            vec![format!(
                "**{}** | {} comments{} | score {} | {}",
                item.subcategory().unwrap_or_default(),
                e.comments,
                badge,
                e.score,
                item.created_at
            )]
        }
        SourceDetail::QaSite { is_answered, .. } => {
            let status = if *is_answered {
                format!("{} answers", e.answers)
            } else {
                "**UNANSWERED**".to_string()
            };
            let mut out = vec![format!(
                "{status} | {} views | score {} | {}",
                e.views, e.score, item.created_at
            )];
            if let Some(tags) = item.subcategory() {
                out.push(format!("Tags: {tags}"));
            }
            out
        }
        SourceDetail::TechNews { item_kind } => vec![format!(
            "{} | {} points | {} comments | {}",
            item_kind.as_str(),
            e.points,
            e.comments,
            item.created_at
        )],
    }
}

fn render_manual_section(lines: &mut Vec<String>, manual: &[ManualPlatformLinks]) {
    lines.push("---".to_string());
    lines.push(format!(
        "## {MANUAL_SECTION_NAME} ({} {})",
        manual.len(),
        SourceKind::Manual.item_noun()
    ));
    lines.push(String::new());
    lines.push("These platforms don't have free APIs. Each link searches the last month's".to_string());
    lines.push("questions and discussions you could reply to.".to_string());
    lines.push(String::new());

    if manual.is_empty() {
        lines.push(EMPTY_SECTION_LINE.to_string());
        lines.push(String::new());
        return;
    }

    for platform in manual {
        lines.push(format!("### {}", platform.platform));
        if let Some(note) = &platform.note {
            lines.push(format!("_{note}_"));
        }
        for link in &platform.links {
            lines.push(format!("- [{}]({})", link.keyword, link.url));
        }
        lines.push(String::new());
    }
}

fn render_rules_section(lines: &mut Vec<String>) {
    lines.push("---".to_string());
    lines.push(format!("## {RULES_SECTION_NAME}"));
    lines.push(String::new());
    for (index, rule) in ENGAGEMENT_RULES.iter().enumerate() {
        lines.push(format!("{}. {rule}", index + 1));
    }
    lines.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::{default_angle_fallback, default_angle_rules};
    use chrono::NaiveDate;
    use oppscan_adapters::{ManualLink, ManualPlatformLinks};
    use oppscan_core::{Engagement, NewsItemKind};

    fn classifier() -> AngleClassifier {
        AngleClassifier::new(
            "https://socialtradingvlog.com",
            default_angle_rules(),
            default_angle_fallback(),
        )
    }

    fn opportunity(id: usize, title: &str, engagement: Engagement, detail: SourceDetail) -> Opportunity {
        Opportunity {
            source_name: "test".into(),
            native_id: id.to_string(),
            title: title.into(),
            url: format!("https://example.test/item/{id}"),
            created_at: "2026-10-18".into(),
            engagement,
            detail,
            matched_keyword: "etoro".into(),
            snippet: None,
            opportunity_score: 0,
        }
    }

    fn forum_post(id: usize, title: &str, comments: u64) -> Opportunity {
        opportunity(
            id,
            title,
            Engagement {
                comments,
                score: 3,
                ..Default::default()
            },
            SourceDetail::SocialForum {
                community: "etoro".into(),
            },
        )
    }

    fn question(id: usize, title: &str, answers: u64, is_answered: bool) -> Opportunity {
        opportunity(
            id,
            title,
            Engagement {
                answers,
                views: 120,
                score: 2,
                ..Default::default()
            },
            SourceDetail::QaSite {
                tags: vec!["investing".into(), "etoro".into()],
                is_answered,
            },
        )
    }

    fn story(id: usize, title: &str) -> Opportunity {
        opportunity(
            id,
            title,
            Engagement {
                points: 12,
                comments: 4,
                ..Default::default()
            },
            SourceDetail::TechNews {
                item_kind: NewsItemKind::Story,
            },
        )
    }

    fn input(sections: Vec<DigestSection>, manual: Vec<ManualPlatformLinks>) -> DigestInput {
        DigestInput {
            generated_at: NaiveDate::from_ymd_opt(2026, 10, 19)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            site_url: "https://socialtradingvlog.com".into(),
            sections,
            manual,
        }
    }

    fn section(kind: SourceKind, name: &str, items: Vec<Opportunity>) -> DigestSection {
        DigestSection {
            kind,
            name: name.into(),
            items,
        }
    }

    fn section_text<'a>(text: &'a str, header_prefix: &str) -> &'a str {
        text.split("\n---\n")
            .find(|part| part.starts_with(header_prefix))
            .unwrap_or_else(|| panic!("no section starting with {header_prefix}"))
    }

    #[test]
    fn long_sections_are_capped_but_headers_keep_full_counts() {
        let reddit = (0..20).map(|i| forum_post(i, &format!("Post {i}"), 5)).collect();
        let qa = (0..12).map(|i| question(i, &format!("Question {i}"), 1, true)).collect();
        let news = (0..12).map(|i| story(i, &format!("Story {i}"))).collect();
        let text = render_digest(
            &input(
                vec![
                    section(SourceKind::SocialForum, "Reddit", reddit),
                    section(SourceKind::QaSite, "Stack Exchange — Money", qa),
                    section(SourceKind::TechNews, "Hacker News", news),
                ],
                Vec::new(),
            ),
            &classifier(),
        );

        assert!(text.starts_with("# Opportunity Digest — 2026-10-19 08:00\n"));
        assert!(text.contains("Found **44** opportunities"));

        let reddit = section_text(&text, "## Reddit (20 posts)");
        assert_eq!(reddit.matches("\n### ").count(), 15);
        let qa = section_text(&text, "## Stack Exchange — Money (12 questions)");
        assert_eq!(qa.matches("\n### ").count(), 10);
        let news = section_text(&text, "## Hacker News (12 mentions)");
        assert_eq!(news.matches("\n### ").count(), 10);
    }

    #[test]
    fn titles_and_snippets_are_cut_for_display() {
        let mut post = forum_post(1, &"t".repeat(120), 1);
        post.snippet = Some("s".repeat(300));
        let text = render_digest(
            &input(vec![section(SourceKind::SocialForum, "Reddit", vec![post])], Vec::new()),
            &classifier(),
        );

        let heading = format!("\n### 1. {}\n", "t".repeat(90));
        assert!(text.contains(&heading));
        let quote = format!("\n> _{}..._\n", "s".repeat(150));
        assert!(text.contains(&quote));
        assert!(text.contains("**r/etoro** | 1 comments **← FEW REPLIES** | score 3 | 2026-10-18"));
    }

    #[test]
    fn question_status_strip_and_tags_line() {
        let text = render_digest(
            &input(
                vec![section(
                    SourceKind::QaSite,
                    "Stack Exchange — Money",
                    vec![
                        question(1, "Is eToro regulated?", 0, false),
                        question(2, "Copy trading taxes", 2, true),
                    ],
                )],
                Vec::new(),
            ),
            &classifier(),
        );

        assert!(text.contains("\n**UNANSWERED** | 120 views | score 2 | 2026-10-18\nTags: investing, etoro\n"));
        assert!(text.contains("\n2 answers | 120 views | score 2 | 2026-10-18\nTags: investing, etoro\n"));
        assert!(!text.contains("FEW REPLIES"));
    }

    #[test]
    fn empty_manual_list_gets_the_placeholder() {
        let text = render_digest(
            &input(
                vec![section(SourceKind::SocialForum, "Reddit", vec![forum_post(1, "Post", 4)])],
                Vec::new(),
            ),
            &classifier(),
        );

        let manual = section_text(&text, "## Manual Checks (0 platforms)");
        assert!(manual.contains(EMPTY_SECTION_LINE));
        assert_eq!(text.matches(EMPTY_SECTION_LINE).count(), 1);
    }

    #[test]
    fn manual_platforms_render_notes_and_links() {
        let manual = vec![ManualPlatformLinks {
            platform: "Quora".into(),
            links: vec![ManualLink {
                keyword: "etoro".into(),
                url: "https://www.google.com/search?q=site%3Aquora.com%20etoro&tbs=qdr:m".into(),
            }],
            note: Some("Personal stories work best".into()),
        }];
        let text = render_digest(&input(Vec::new(), manual), &classifier());

        assert!(text.contains("plus manual search links for 1 additional platforms."));
        let section = section_text(&text, "## Manual Checks (1 platforms)");
        assert!(section.contains(
            "### Quora\n_Personal stories work best_\n- [etoro](https://www.google.com/search?q=site%3Aquora.com%20etoro&tbs=qdr:m)\n"
        ));
    }

    #[test]
    fn engagement_rules_close_the_digest_verbatim() {
        let text = render_digest(&input(Vec::new(), Vec::new()), &classifier());
        let expected = ENGAGEMENT_RULES
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {rule}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(text.ends_with(&format!("---\n## Engagement Rules\n\n{expected}\n")));
        assert!(text.contains(
            "1. **Answer the question first** — be genuinely helpful\n"
        ));
        assert!(text.contains(
            "7. **Never copy-paste** the same answer twice — customise for each question\n"
        ));
    }
}
