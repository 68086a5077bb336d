// src/validate.rs
//! Content validity filter. Rejects listing, index and feed pages so only
//! genuine articles reach scoring.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::Rejection;
use crate::ingest::types::RawDocument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub min_body_chars: usize,
    pub max_links: usize,
    pub link_dense_below_chars: usize,
    pub min_paragraphs: usize,
    pub min_paragraph_chars: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_body_chars: 500,
            max_links: 20,
            link_dense_below_chars: 2000,
            min_paragraphs: 3,
            min_paragraph_chars: 50,
        }
    }
}

struct UrlPattern {
    label: &'static str,
    re: Regex,
}

fn url_patterns() -> &'static [UrlPattern] {
    static PATS: OnceCell<Vec<UrlPattern>> = OnceCell::new();
    PATS.get_or_init(|| {
        [
            ("pagination", r"(?i)/page/\d+(/|$)"),
            ("pagination", r"(?i)[?&]page=\d+"),
            (
                "index",
                r"(?i)/(category|categories|tag|tags|archive|archives|author)(/|$)",
            ),
            ("feed", r"(?i)/(feed|rss|atom)(/|$|\.)"),
            ("feed", r"(?i)\.(xml|rss|atom)$"),
        ]
        .into_iter()
        .map(|(label, pat)| UrlPattern {
            label,
            re: Regex::new(pat).unwrap(),
        })
        .collect()
    })
}

fn title_patterns() -> &'static [Regex] {
    static PATS: OnceCell<Vec<Regex>> = OnceCell::new();
    PATS.get_or_init(|| {
        [
            r"(?i)\bpage\s+\d+\s+of\s+\d+\b",
            r"(?i)^\s*(category|tag|topic|author)\s*:",
            r"(?i)^\s*(the\s+)?archives?\s*$",
            r"(?i)\barchives?\s*(:|\||-)",
        ]
        .into_iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn link_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\([^)\s]+\)|https?://\S+").unwrap())
}

/// Paragraphs (non-empty lines) with more than `min_chars` characters.
pub fn substantial_paragraphs(body: &str, min_chars: usize) -> usize {
    body.lines()
        .filter(|p| p.trim().chars().count() > min_chars)
        .count()
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: ValidationRules,
}

impl Validator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Cheap pre-fetch check on the URL path and the title alone.
    pub fn check_url_and_title(&self, url: &str, title: &str) -> Result<(), Rejection> {
        let parsed = url::Url::parse(url).map_err(|_| Rejection::InvalidUrl)?;
        let mut target = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            target.push('?');
            target.push_str(q);
        }
        if let Some(p) = url_patterns().iter().find(|p| p.re.is_match(&target)) {
            return Err(Rejection::IndexUrl(p.label));
        }
        if title_patterns().iter().any(|re| re.is_match(title)) {
            return Err(Rejection::IndexTitle);
        }
        Ok(())
    }

    /// Full check. URL and title first, then body shape.
    pub fn validate(&self, doc: &RawDocument) -> Result<(), Rejection> {
        self.check_url_and_title(&doc.url, &doc.title)?;

        let r = &self.rules;
        let len = doc.body.chars().count();
        if len < r.min_body_chars {
            return Err(Rejection::BodyTooShort {
                len,
                min: r.min_body_chars,
            });
        }

        if len < r.link_dense_below_chars {
            let links = link_re().find_iter(&doc.body).count();
            if links > r.max_links {
                return Err(Rejection::LinkDense { links, len });
            }
        }

        let found = substantial_paragraphs(&doc.body, r.min_paragraph_chars);
        if found < r.min_paragraphs {
            return Err(Rejection::TooFewParagraphs {
                found,
                min: r.min_paragraphs,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(n: usize) -> String {
        "Automation teams keep shipping workflow improvements every quarter. ".repeat(n)
    }

    fn doc(url: &str, title: &str, body: String) -> RawDocument {
        RawDocument {
            url: url.into(),
            title: title.into(),
            body,
            ..Default::default()
        }
    }

    fn good_body() -> String {
        [para(3), para(3), para(3)].join("\n")
    }

    #[test]
    fn accepts_regular_article() {
        let v = Validator::default();
        let d = doc("https://blog.example.com/2024/05/ai-ops", "AI ops in practice", good_body());
        assert_eq!(v.validate(&d), Ok(()));
    }

    #[test]
    fn rejects_index_urls() {
        let v = Validator::default();
        for u in [
            "https://x.com/blog/page/2",
            "https://x.com/blog?page=3",
            "https://x.com/category/ai/",
            "https://x.com/tag/rpa",
            "https://x.com/archives/2023",
            "https://x.com/author/jane",
            "https://x.com/feed",
            "https://x.com/rss.xml",
        ] {
            assert!(
                matches!(v.check_url_and_title(u, "fine"), Err(Rejection::IndexUrl(_))),
                "{u} should be rejected"
            );
        }
    }

    #[test]
    fn does_not_flag_article_slugs_containing_words() {
        let v = Validator::default();
        assert!(v
            .check_url_and_title("https://x.com/posts/tagging-best-practices", "Tagging")
            .is_ok());
        assert!(v
            .check_url_and_title("https://x.com/posts/feedback-loops", "Feedback loops")
            .is_ok());
    }

    #[test]
    fn page_n_of_m_title_always_rejected() {
        let v = Validator::default();
        let d = doc("https://x.com/posts/a", "Page 7 of 120", good_body());
        assert_eq!(v.validate(&d), Err(Rejection::IndexTitle));
    }

    #[test]
    fn index_titles_rejected() {
        let v = Validator::default();
        for t in ["Archives", "Category: AI", "Tag: automation", "Author: Jane Doe"] {
            assert_eq!(
                v.check_url_and_title("https://x.com/posts/a", t),
                Err(Rejection::IndexTitle),
                "{t}"
            );
        }
    }

    #[test]
    fn short_body_rejected_regardless_of_title() {
        let v = Validator::default();
        let body: String = "x".repeat(300);
        let d = doc("https://x.com/posts/a", "AI breakthrough", body);
        assert_eq!(
            v.validate(&d),
            Err(Rejection::BodyTooShort { len: 300, min: 500 })
        );
    }

    #[test]
    fn link_dense_listing_rejected() {
        let v = Validator::default();
        let links: Vec<String> = (0..25)
            .map(|i| format!("[Post number {i} about things](https://x.com/p/{i})"))
            .collect();
        let body = links.join("\n");
        let len = body.chars().count();
        assert!((500..2000).contains(&len));
        assert_eq!(v.validate(&doc("https://x.com/", "Blog", body)), Err(Rejection::LinkDense { links: 25, len }));
    }

    #[test]
    fn too_few_paragraphs_rejected() {
        let v = Validator::default();
        let body = format!("{}\n{}", para(5), para(5));
        assert_eq!(
            v.validate(&doc("https://x.com/posts/a", "Title", body)),
            Err(Rejection::TooFewParagraphs { found: 2, min: 3 })
        );
    }
}
