//! Reply-angle classification: title keywords -> (angle, internal page).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleRule {
    pub bucket: String,
    /// Lower-case substrings; any hit in the lower-cased title selects the rule.
    pub contains_any: Vec<String>,
    pub angle: String,
    /// Path on the site, joined to the site URL.
    pub page: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleFallback {
    pub angle: String,
    pub page: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Angle {
    pub bucket: String,
    pub text: String,
    pub url: String,
}

/// Ordered rules, first match wins, fallback catches the rest.
#[derive(Debug, Clone)]
pub struct AngleClassifier {
    site_url: String,
    rules: Vec<AngleRule>,
    fallback: AngleFallback,
}

impl AngleClassifier {
    pub fn new(site_url: &str, rules: Vec<AngleRule>, fallback: AngleFallback) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            rules,
            fallback,
        }
    }

    pub fn classify(&self, title: &str) -> Angle {
        let lowered = title.to_lowercase();
        for rule in &self.rules {
            if rule
                .contains_any
                .iter()
                .any(|needle| lowered.contains(&needle.to_lowercase()))
            {
                return Angle {
                    bucket: rule.bucket.clone(),
                    text: rule.angle.clone(),
                    url: self.page_url(&rule.page),
                };
            }
        }
        Angle {
            bucket: "fallback".to_string(),
            text: self.fallback.angle.clone(),
            url: self.page_url(&self.fallback.page),
        }
    }

    fn page_url(&self, page: &str) -> String {
        let page = page.trim();
        if page.is_empty() || page == "/" {
            self.site_url.clone()
        } else if page.starts_with('/') {
            format!("{}{}", self.site_url, page)
        } else {
            format!("{}/{}", self.site_url, page)
        }
    }
}

fn rule(bucket: &str, contains_any: &[&str], angle: &str, page: &str) -> AngleRule {
    AngleRule {
        bucket: bucket.to_string(),
        contains_any: contains_any.iter().map(|s| s.to_string()).collect(),
        angle: angle.to_string(),
        page: page.to_string(),
    }
}

pub fn default_angle_rules() -> Vec<AngleRule> {
    vec![
        rule(
            "trust",
            &["scam", "legit", "safe", "trust", "fraud", "fake"],
            "Share your 6+ years of real experience — honest pros AND cons",
            "/etoro-review/",
        ),
        rule(
            "risk",
            &["lose", "loss", "losing", "76%", "risk", "danger"],
            "Explain the 76% stat with real context from your experience",
            "/video/why-do-most-etoro-traders-lose-money/",
        ),
        rule(
            "beginner",
            &["beginner", "start", "new to", "how to", "getting started"],
            "Practical getting-started advice from someone who's done it 6 years",
            "/copy-trading.html",
        ),
        rule(
            "returns",
            &["profit", "return", "make money", "earn", "how much", "worth"],
            "Realistic expectations backed by 6 years of documented results",
            "/copy-trading-returns.html",
        ),
        rule(
            "fees",
            &["fee", "cost", "charge", "spread", "withdraw"],
            "Break down real costs with specific numbers from your account",
            "/etoro-review/",
        ),
        rule(
            "trader-selection",
            &["who to copy", "best trader", "pick trader", "choose"],
            "How to evaluate traders — what metrics actually matter",
            "/copy-trading.html",
        ),
        rule(
            "profit-taking",
            &["take profit", "stop loss", "when to sell", "exit"],
            "When and how to take profits from copy trading",
            "/taking-profits.html",
        ),
    ]
}

pub fn default_angle_fallback() -> AngleFallback {
    AngleFallback {
        angle: "Share genuine experience as a 6-year eToro user".to_string(),
        page: String::new(),
    }
}
