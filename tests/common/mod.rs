// tests/common/mod.rs
//
// Shared fakes for integration tests: an in-process fetcher and a scripted
// generation platform, plus builders for documents and stored items.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use content_curator::config::CuratorConfig;
use content_curator::errors::{DispatchError, FetchError};
use content_curator::history::RunHistory;
use content_curator::ingest::types::{DocumentFetcher, RawDocument};
use content_curator::model::{Category, ContentSource, NewContentItem, SourceId};
use content_curator::orchestrator::Pipeline;
use content_curator::relevance::{RelevanceEngine, RelevanceHandle};
use content_curator::store::ContentStore;
use content_curator::submit::platform::{DispatchPayload, GenerationPlatform};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// Five substantial paragraphs about automation. `topic` makes the text unique.
pub fn article_body(topic: &str) -> String {
    [
        format!("Teams adopting {topic} report that workflow automation removes hours of manual process work every week across the business."),
        format!("The enterprise rollout of {topic} started with a small integration pilot and grew into a platform for efficiency and productivity gains."),
        format!("Engineers describe how {topic} changed their orchestration layer, with AI assistants handling routine triage and escalation paths."),
        format!("Leaders expect {topic} to keep shaping digital transformation plans, since measured results beat every earlier technology investment."),
        format!("Analysts tracking {topic} note that B2B SaaS vendors now ship automation features as standard across every product tier."),
    ]
    .join("\n")
}

pub fn doc(url: &str, title: &str, body: &str) -> RawDocument {
    RawDocument {
        url: url.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        summary: format!("Summary of {title}"),
        author: Some("Staff".to_string()),
        published_at: Some(fixed_now() - Duration::hours(2)),
        tags: vec!["Automation".to_string()],
    }
}

/// A well-formed article that passes validation and scores high.
pub fn good_doc(url: &str, topic: &str) -> RawDocument {
    doc(url, &format!("AI automation workflow: {topic}"), &article_body(topic))
}

pub fn new_item(
    url: &str,
    score: f64,
    category: Category,
    source_id: SourceId,
) -> NewContentItem {
    NewContentItem {
        url: url.to_string(),
        title: format!("Title for {url}"),
        body: article_body(url),
        summary: format!("Summary for {url}"),
        keywords: vec!["automation".to_string()],
        author: None,
        published_at: Some(fixed_now() - Duration::days(1)),
        source_id,
        source_name: format!("source-{source_id}"),
        fingerprint: format!("fp:{url}"),
        relevance_score: score,
        category,
        discovered_at: fixed_now(),
    }
}

/// Serves canned feeds keyed by feed URL and canned pages keyed by article URL.
#[derive(Default)]
pub struct MockFetcher {
    feeds: HashMap<String, Vec<RawDocument>>,
    failing: HashSet<String>,
    pages: HashMap<String, RawDocument>,
    pub discover_calls: AtomicUsize,
    pub document_calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, feed_url: &str, docs: Vec<RawDocument>) -> Self {
        self.feeds.insert(feed_url.to_string(), docs);
        self
    }

    pub fn with_failing_feed(mut self, feed_url: &str) -> Self {
        self.failing.insert(feed_url.to_string());
        self
    }

    pub fn with_page(mut self, doc: RawDocument) -> Self {
        self.pages.insert(doc.url.clone(), doc);
        self
    }
}

#[async_trait]
impl DocumentFetcher for MockFetcher {
    async fn discover(&self, source: &ContentSource) -> Result<Vec<RawDocument>, FetchError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let feed = source.feed_url.as_deref().unwrap_or(&source.url);
        if self.failing.contains(feed) {
            return Err(FetchError::Upstream(format!("{feed}: HTTP 503")));
        }
        Ok(self.feeds.get(feed).cloned().unwrap_or_default())
    }

    async fn fetch_document(&self, url: &str) -> Result<RawDocument, FetchError> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Upstream(format!("{url}: HTTP 404")))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Accepts every payload except those whose URL is in the failure set.
#[derive(Default)]
pub struct MockPlatform {
    fail_urls: HashSet<String>,
    pub calls: AtomicUsize,
    pub accepted: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(urls: &[&str]) -> Self {
        Self {
            fail_urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationPlatform for MockPlatform {
    async fn dispatch(&self, payload: &DispatchPayload) -> Result<String, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_urls.contains(&payload.url) {
            return Err(DispatchError::Rejected {
                status: 500,
                message: "workflow unavailable".to_string(),
            });
        }
        self.accepted.lock().unwrap().push(payload.url.clone());
        Ok(format!("job-{}", payload.item_id))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Defaults with the scheduler off and the in-memory store.
pub fn test_config() -> CuratorConfig {
    let mut cfg = CuratorConfig::default();
    cfg.pipeline.scheduler_enabled = false;
    cfg.store.db_path = String::new();
    cfg
}

pub fn pipeline(
    cfg: &CuratorConfig,
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    platform: Arc<dyn GenerationPlatform>,
) -> Pipeline {
    let engine = RelevanceEngine::new(cfg.scoring.clone()).expect("scoring config");
    Pipeline::new(
        cfg,
        store,
        fetcher,
        platform,
        RelevanceHandle::new(engine),
        Arc::new(RunHistory::with_capacity(10)),
    )
}
