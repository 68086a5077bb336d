// src/ingest/mod.rs
pub mod rss;
pub mod scheduler;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Normalize short text (titles, summaries): decode entities, strip tags,
/// straighten quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Reduce an HTML (or plain text) body to paragraph-per-line text.
/// Anchors survive as `[text](href)` so link density can still be measured.
pub fn normalize_body(html: &str) -> String {
    static RE_DROP: OnceCell<Regex> = OnceCell::new();
    static RE_ANCHOR: OnceCell<Regex> = OnceCell::new();
    static RE_BLOCK: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_HWS: OnceCell<Regex> = OnceCell::new();

    let re_drop = RE_DROP.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript|nav|footer|header|aside)\b[^>]*>.*?</(script|style|noscript|nav|footer|header|aside)>").unwrap()
    });
    let re_anchor = RE_ANCHOR.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
    });
    let re_block = RE_BLOCK.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|blockquote|pre|tr|section|article)>")
            .unwrap()
    });
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let re_hws = RE_HWS.get_or_init(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());

    let out = re_drop.replace_all(html, "");
    let out = re_anchor.replace_all(&out, "[$2]($1)");
    let out = re_block.replace_all(&out, "\n");
    let out = re_tags.replace_all(&out, "");
    let out = html_escape::decode_html_entities(&out).to_string();

    out.lines()
        .map(|line| re_hws.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "this", "that", "these",
    "those", "i", "you", "he", "she", "it", "we", "they", "them", "their", "about", "into",
    "than", "then", "there", "what", "when", "which", "while", "your", "also", "just", "more",
];

/// Cheap keyword extraction: feed tags first, then the first distinct
/// non-stop-words longer than three characters.
pub fn extract_keywords(tags: &[String], text: &str, max_keywords: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(max_keywords);
    let mut push = |w: String, out: &mut Vec<String>| {
        if !w.is_empty() && !out.contains(&w) && out.len() < max_keywords {
            out.push(w);
        }
    };

    for t in tags {
        push(normalize_text(t).to_lowercase(), &mut out);
    }
    for raw in text.split_whitespace() {
        if out.len() >= max_keywords {
            break;
        }
        let word: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if word.chars().count() > 3 && !STOP_WORDS.contains(&word.as_str()) {
            push(word, &mut out);
        }
    }
    out
}
