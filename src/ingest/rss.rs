// src/ingest/rss.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tracing::{debug, warn};

use crate::errors::FetchError;
use crate::ingest::types::{DocumentFetcher, RawDocument};
use crate::ingest::{normalize_body, normalize_text};
use crate::model::ContentSource;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "encoded", alias = "content:encoded")]
    content_encoded: Option<String>,
    author: Option<String>,
    #[serde(rename = "creator", alias = "dc:creator")]
    creator: Option<String>,
    #[serde(default)]
    category: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_secs: u64,
    pub max_attempts: u8,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_attempts: 3,
            user_agent: concat!("content-curator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse an RSS 2.0 document. Entries older than `freshness_days` are dropped;
/// undated entries are kept. Entries without a link are skipped.
pub fn parse_feed(
    xml: &str,
    now: DateTime<Utc>,
    freshness_days: i64,
) -> Result<Vec<RawDocument>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;
    let cutoff = now - chrono::Duration::days(freshness_days.max(0));

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(url) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
            continue;
        };
        let published_at = it.pub_date.as_deref().and_then(parse_rfc2822);
        if published_at.is_some_and(|p| p < cutoff) {
            debug!(target: "ingest", %url, "stale feed entry skipped");
            continue;
        }

        let description = it.description.unwrap_or_default();
        let body_html = it.content_encoded.as_deref().unwrap_or(&description);
        out.push(RawDocument {
            url,
            title: normalize_text(it.title.as_deref().unwrap_or_default()),
            body: normalize_body(body_html),
            summary: normalize_text(&description),
            author: it
                .creator
                .or(it.author)
                .map(|a| normalize_text(&a))
                .filter(|a| !a.is_empty()),
            published_at,
            tags: it
                .category
                .iter()
                .map(|c| normalize_text(c))
                .filter(|c| !c.is_empty())
                .collect(),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("curator_feed_parse_ms").record(ms);
    Ok(out)
}

/// Pull title, description, publish time and the main text out of an article page.
pub fn parse_article(url: &str, html: &str) -> RawDocument {
    static RE_TITLE: OnceCell<Regex> = OnceCell::new();
    static RE_DESC: OnceCell<Regex> = OnceCell::new();
    static RE_PUBLISHED: OnceCell<Regex> = OnceCell::new();
    static RE_ARTICLE: OnceCell<Regex> = OnceCell::new();
    static RE_BODY: OnceCell<Regex> = OnceCell::new();

    let re_title = RE_TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
    let re_desc = RE_DESC.get_or_init(|| {
        Regex::new(r#"(?is)<meta[^>]+(?:name|property)\s*=\s*["'](?:og:)?description["'][^>]*content\s*=\s*["']([^"']*)["']"#).unwrap()
    });
    let re_published = RE_PUBLISHED.get_or_init(|| {
        Regex::new(r#"(?is)<meta[^>]+property\s*=\s*["']article:published_time["'][^>]*content\s*=\s*["']([^"']+)["']"#).unwrap()
    });
    let re_article =
        RE_ARTICLE.get_or_init(|| Regex::new(r"(?is)<article\b[^>]*>(.*)</article>").unwrap());
    let re_body = RE_BODY.get_or_init(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").unwrap());

    let cap1 = |re: &Regex| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let main = cap1(re_article)
        .or_else(|| cap1(re_body))
        .unwrap_or_else(|| html.to_string());

    RawDocument {
        url: url.to_string(),
        title: cap1(re_title).map(|t| normalize_text(&t)).unwrap_or_default(),
        body: normalize_body(&main),
        summary: cap1(re_desc).map(|d| normalize_text(&d)).unwrap_or_default(),
        author: None,
        published_at: cap1(re_published)
            .and_then(|p| DateTime::parse_from_rfc3339(p.trim()).ok())
            .map(|d| d.with_timezone(&Utc)),
        tags: Vec::new(),
    }
}

pub struct RssFetcher {
    client: Client,
    cfg: FetcherConfig,
    freshness_days: i64,
}

impl RssFetcher {
    pub fn new(cfg: FetcherConfig, freshness_days: i64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            cfg,
            freshness_days,
        })
    }

    /// GET with bounded exponential backoff (500ms, 1s, ...). 4xx responses are not retried.
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let max = self.cfg.max_attempts.max(1);
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let err = match self.client.get(url).send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(rsp.text().await?);
                    }
                    if status.is_client_error() {
                        return Err(FetchError::Upstream(format!("{url}: HTTP {status}")));
                    }
                    FetchError::Upstream(format!("{url}: HTTP {status}"))
                }
                Err(e) => FetchError::Http(e),
            };
            if attempt >= max {
                return Err(err);
            }
            warn!(target: "ingest", %url, attempt, error = %err, "fetch failed; retrying");
            counter!("curator_fetch_retries_total").increment(1);
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl DocumentFetcher for RssFetcher {
    async fn discover(&self, source: &ContentSource) -> Result<Vec<RawDocument>, FetchError> {
        let feed_url = source.feed_url.as_deref().unwrap_or(&source.url);
        let body = self.get_text(feed_url).await?;
        parse_feed(&body, Utc::now(), self.freshness_days)
    }

    async fn fetch_document(&self, url: &str) -> Result<RawDocument, FetchError> {
        let html = self.get_text(url).await?;
        Ok(parse_article(url, &html))
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}
