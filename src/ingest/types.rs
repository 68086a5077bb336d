// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::errors::FetchError;
use crate::model::ContentSource;

/// A document as produced by the fetch layer, before validation.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawDocument {
    pub url: String,
    pub title: String,
    pub body: String, // paragraph-preserving text, links kept as [text](href)
    pub summary: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl RawDocument {
    /// Fill gaps in a feed entry with the fully fetched page.
    /// Feed metadata wins where present; the body always comes from the page.
    pub fn merge_full(self, full: RawDocument) -> RawDocument {
        RawDocument {
            url: self.url,
            title: if self.title.is_empty() { full.title } else { self.title },
            body: full.body,
            summary: if self.summary.is_empty() { full.summary } else { self.summary },
            author: self.author.or(full.author),
            published_at: self.published_at.or(full.published_at),
            tags: if self.tags.is_empty() { full.tags } else { self.tags },
        }
    }
}

#[async_trait::async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// List the entries a source currently advertises. Bodies may be partial.
    async fn discover(&self, source: &ContentSource) -> Result<Vec<RawDocument>, FetchError>;

    /// Retrieve one full document. This is the expensive call.
    async fn fetch_document(&self, url: &str) -> Result<RawDocument, FetchError>;

    fn name(&self) -> &'static str;
}
