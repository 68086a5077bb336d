// src/model.rs
//! Domain records shared by every pipeline stage: sources, content items,
//! daily quota rows and submission records.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type ItemId = i64;
pub type SourceId = i64;

/// Category tag used by the selector for diversity balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    IndustryNews,
    ThoughtLeadership,
    CaseStudy,
}

impl Category {
    /// Fixed order, also used to break ties in categorization.
    pub const ALL: [Category; 3] = [
        Category::IndustryNews,
        Category::ThoughtLeadership,
        Category::CaseStudy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::IndustryNews => "industry_news",
            Category::ThoughtLeadership => "thought_leadership",
            Category::CaseStudy => "case_study",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local view of an item's dispatch state. The platform's own lifecycle is not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    DispatchFailed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::DispatchFailed => "dispatch_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "submitted" => Some(SubmissionStatus::Submitted),
            "dispatch_failed" => Some(SubmissionStatus::DispatchFailed),
            _ => None,
        }
    }
}

/// A configured origin to pull items from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub kind: String,
    pub active: bool,
    /// Max new items this source may add to one run's candidate pool.
    pub max_items: u32,
    pub priority: u8,
    pub feed_url: Option<String>,
    pub last_pulled_at: Option<DateTime<Utc>>,
}

/// Source definition as written in config (`[[sources]]`), before it gets an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSeed {
    pub name: String,
    pub url: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub feed_url: Option<String>,
}

fn default_kind() -> String {
    "blog".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_items() -> u32 {
    3
}
fn default_priority() -> u8 {
    1
}

impl SourceSeed {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: default_kind(),
            active: true,
            max_items: default_max_items(),
            priority: default_priority(),
            feed_url: None,
        }
    }

    pub fn with_feed(mut self, feed_url: impl Into<String>) -> Self {
        self.feed_url = Some(feed_url.into());
        self
    }

    pub fn with_max_items(mut self, max_items: u32) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A scored, categorized item ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentItem {
    pub url: String,
    pub title: String,
    pub body: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: SourceId,
    pub source_name: String,
    pub fingerprint: String,
    pub relevance_score: f64,
    pub category: Category,
    pub discovered_at: DateTime<Utc>,
}

/// A stored content item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub id: ItemId,
    /// Canonical (normalized) URL.
    pub url: String,
    pub title: String,
    #[serde(skip_serializing)]
    pub body: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: SourceId,
    pub source_name: String,
    pub fingerprint: String,
    pub relevance_score: Option<f64>,
    pub category: Option<Category>,
    pub processed: bool,
    pub status: SubmissionStatus,
    pub discovered_at: DateTime<Utc>,
}

impl ContentItem {
    /// Materialize a stored row from a freshly inserted item.
    pub fn from_new(id: ItemId, new: NewContentItem) -> Self {
        Self {
            id,
            url: new.url,
            title: new.title,
            body: new.body,
            summary: new.summary,
            keywords: new.keywords,
            author: new.author,
            published_at: new.published_at,
            source_id: new.source_id,
            source_name: new.source_name,
            fingerprint: new.fingerprint,
            relevance_score: Some(new.relevance_score),
            category: Some(new.category),
            processed: false,
            status: SubmissionStatus::Pending,
            discovered_at: new.discovered_at,
        }
    }
}

/// Result of an insert attempt against the unique URL / fingerprint constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(ItemId),
    DuplicateUrl,
    DuplicateFingerprint,
}

/// Daily submission counter for one UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyQuota {
    pub date: NaiveDate,
    pub count: u32,
    pub limit: u32,
}

impl DailyQuota {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Outcome of handing one item to the generation platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    pub item_id: ItemId,
    pub job_id: Option<String>,
    pub status: SubmissionStatus,
    pub dispatched_at: DateTime<Utc>,
    pub error: Option<String>,
}
