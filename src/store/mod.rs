// src/store/mod.rs
//! Persistence seam. Every cross-run invariant (unique URL and fingerprint,
//! the processed flag, the daily counter) is enforced here atomically, so
//! concurrent runs need no lock of their own.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::StoreError;
use crate::model::{
    ContentItem, ContentSource, InsertOutcome, ItemId, NewContentItem, SourceId,
    SourceSeed, SubmissionRecord,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    async fn list_active_sources(&self) -> Result<Vec<ContentSource>, StoreError>;
    async fn list_sources(&self) -> Result<Vec<ContentSource>, StoreError>;
    /// Insert or update by origin URL. Returns the source id.
    async fn upsert_source(&self, seed: &SourceSeed) -> Result<SourceId, StoreError>;
    async fn touch_source(&self, id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn url_exists(&self, canonical_url: &str) -> Result<bool, StoreError>;
    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, StoreError>;
    /// Uniqueness on URL and fingerprint is enforced by the store itself.
    async fn insert_item(&self, item: &NewContentItem) -> Result<InsertOutcome, StoreError>;
    async fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>, StoreError>;

    /// Check-and-set false → true. Returns whether this caller won the mark.
    async fn mark_processed(&self, id: ItemId) -> Result<bool, StoreError>;
    /// Unprocessed items scored at or above `min_score`, in insertion order.
    async fn get_unprocessed_items(&self, min_score: f64) -> Result<Vec<ContentItem>, StoreError>;

    async fn get_daily_count(&self, date: NaiveDate) -> Result<u32, StoreError>;
    /// Atomically add up to `n` without passing `limit`. Returns how many were applied.
    async fn increment_daily_count(
        &self,
        date: NaiveDate,
        n: u32,
        limit: u32,
    ) -> Result<u32, StoreError>;
    /// Give back slots that were claimed but not used. Never drops below zero.
    async fn release_daily_count(&self, date: NaiveDate, n: u32) -> Result<(), StoreError>;

    /// Persist a submission record and mirror its status onto the item.
    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError>;
    async fn recent_submissions(&self, limit: usize) -> Result<Vec<SubmissionRecord>, StoreError>;
}

