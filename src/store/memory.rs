// src/store/memory.rs
//! Mutex-guarded in-memory store. Used by tests and when no database path is
//! configured. Every trait method takes the lock once, which gives the same
//! atomicity the SQLite store gets from its statements.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};

use super::ContentStore;
use crate::errors::StoreError;
use crate::model::{
    ContentItem, ContentSource, InsertOutcome, ItemId, NewContentItem, SourceId, SourceSeed,
    SubmissionRecord,
};

#[derive(Default)]
struct Inner {
    sources: BTreeMap<SourceId, ContentSource>,
    items: BTreeMap<ItemId, ContentItem>,
    by_url: HashMap<String, ItemId>,
    by_fingerprint: HashMap<String, ItemId>,
    daily: HashMap<NaiveDate, u32>,
    submissions: Vec<SubmissionRecord>,
    next_source_id: SourceId,
    next_item_id: ItemId,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

#[async_trait::async_trait]
impl ContentStore for InMemoryStore {
    async fn list_active_sources(&self) -> Result<Vec<ContentSource>, StoreError> {
        let g = self.lock()?;
        Ok(g.sources.values().filter(|s| s.active).cloned().collect())
    }

    async fn list_sources(&self) -> Result<Vec<ContentSource>, StoreError> {
        let g = self.lock()?;
        Ok(g.sources.values().cloned().collect())
    }

    async fn upsert_source(&self, seed: &SourceSeed) -> Result<SourceId, StoreError> {
        let mut g = self.lock()?;
        if let Some(existing) = g.sources.values_mut().find(|s| s.url == seed.url) {
            existing.name = seed.name.clone();
            existing.kind = seed.kind.clone();
            existing.active = seed.active;
            existing.max_items = seed.max_items;
            existing.priority = seed.priority;
            existing.feed_url = seed.feed_url.clone();
            return Ok(existing.id);
        }
        g.next_source_id += 1;
        let id = g.next_source_id;
        g.sources.insert(
            id,
            ContentSource {
                id,
                name: seed.name.clone(),
                url: seed.url.clone(),
                kind: seed.kind.clone(),
                active: seed.active,
                max_items: seed.max_items,
                priority: seed.priority,
                feed_url: seed.feed_url.clone(),
                last_pulled_at: None,
            },
        );
        Ok(id)
    }

    async fn touch_source(&self, id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut g = self.lock()?;
        if let Some(s) = g.sources.get_mut(&id) {
            s.last_pulled_at = Some(at);
        }
        Ok(())
    }

    async fn url_exists(&self, canonical_url: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.by_url.contains_key(canonical_url))
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.by_fingerprint.contains_key(fingerprint))
    }

    async fn insert_item(&self, item: &NewContentItem) -> Result<InsertOutcome, StoreError> {
        let mut g = self.lock()?;
        if g.by_url.contains_key(&item.url) {
            return Ok(InsertOutcome::DuplicateUrl);
        }
        if g.by_fingerprint.contains_key(&item.fingerprint) {
            return Ok(InsertOutcome::DuplicateFingerprint);
        }
        g.next_item_id += 1;
        let id = g.next_item_id;
        g.by_url.insert(item.url.clone(), id);
        g.by_fingerprint.insert(item.fingerprint.clone(), id);
        g.items.insert(id, ContentItem::from_new(id, item.clone()));
        Ok(InsertOutcome::Inserted(id))
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.lock()?.items.get(&id).cloned())
    }

    async fn mark_processed(&self, id: ItemId) -> Result<bool, StoreError> {
        let mut g = self.lock()?;
        match g.items.get_mut(&id) {
            Some(item) if !item.processed => {
                item.processed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_unprocessed_items(&self, min_score: f64) -> Result<Vec<ContentItem>, StoreError> {
        let g = self.lock()?;
        Ok(g.items
            .values()
            .filter(|i| !i.processed && i.relevance_score.is_some_and(|s| s >= min_score))
            .cloned()
            .collect())
    }

    async fn get_daily_count(&self, date: NaiveDate) -> Result<u32, StoreError> {
        Ok(self.lock()?.daily.get(&date).copied().unwrap_or(0))
    }

    async fn increment_daily_count(
        &self,
        date: NaiveDate,
        n: u32,
        limit: u32,
    ) -> Result<u32, StoreError> {
        let mut g = self.lock()?;
        let count = g.daily.entry(date).or_insert(0);
        let applied = n.min(limit.saturating_sub(*count));
        *count += applied;
        Ok(applied)
    }

    async fn release_daily_count(&self, date: NaiveDate, n: u32) -> Result<(), StoreError> {
        let mut g = self.lock()?;
        if let Some(count) = g.daily.get_mut(&date) {
            *count = count.saturating_sub(n);
        }
        Ok(())
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let mut g = self.lock()?;
        if let Some(item) = g.items.get_mut(&record.item_id) {
            item.status = record.status;
        }
        g.submissions.push(record.clone());
        Ok(())
    }

    async fn recent_submissions(&self, limit: usize) -> Result<Vec<SubmissionRecord>, StoreError> {
        let g = self.lock()?;
        Ok(g.submissions.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, SubmissionStatus};

    fn new_item(url: &str, fp: &str, score: f64) -> NewContentItem {
        NewContentItem {
            url: url.into(),
            title: "t".into(),
            body: "b".into(),
            summary: String::new(),
            keywords: vec![],
            author: None,
            published_at: None,
            source_id: 1,
            source_name: "s".into(),
            fingerprint: fp.into(),
            relevance_score: score,
            category: Category::IndustryNews,
            discovered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unique_url_and_fingerprint() {
        let s = InMemoryStore::new();
        assert!(matches!(
            s.insert_item(&new_item("u1", "f1", 0.9)).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert_eq!(
            s.insert_item(&new_item("u1", "f2", 0.9)).await.unwrap(),
            InsertOutcome::DuplicateUrl
        );
        assert_eq!(
            s.insert_item(&new_item("u2", "f1", 0.9)).await.unwrap(),
            InsertOutcome::DuplicateFingerprint
        );
    }

    #[tokio::test]
    async fn mark_processed_is_check_and_set() {
        let s = InMemoryStore::new();
        let InsertOutcome::Inserted(id) = s.insert_item(&new_item("u", "f", 0.7)).await.unwrap()
        else {
            panic!("expected insert");
        };
        assert!(s.mark_processed(id).await.unwrap());
        assert!(!s.mark_processed(id).await.unwrap());
        assert!(!s.mark_processed(id + 100).await.unwrap());
        assert!(s.get_unprocessed_items(0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn capped_increment_and_release() {
        let s = InMemoryStore::new();
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(s.get_daily_count(d).await.unwrap(), 0);
        assert_eq!(s.increment_daily_count(d, 4, 5).await.unwrap(), 4);
        assert_eq!(s.increment_daily_count(d, 4, 5).await.unwrap(), 1);
        assert_eq!(s.increment_daily_count(d, 1, 5).await.unwrap(), 0);
        s.release_daily_count(d, 2).await.unwrap();
        assert_eq!(s.get_daily_count(d).await.unwrap(), 3);
        s.release_daily_count(d, 10).await.unwrap();
        assert_eq!(s.get_daily_count(d).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submission_status_mirrors_onto_item() {
        let s = InMemoryStore::new();
        let InsertOutcome::Inserted(id) = s.insert_item(&new_item("u", "f", 0.7)).await.unwrap()
        else {
            panic!("expected insert");
        };
        s.record_submission(&SubmissionRecord {
            item_id: id,
            job_id: None,
            status: SubmissionStatus::DispatchFailed,
            dispatched_at: Utc::now(),
            error: Some("boom".into()),
        })
        .await
        .unwrap();
        let item = s.get_item(id).await.unwrap().unwrap();
        assert_eq!(item.status, SubmissionStatus::DispatchFailed);
        assert_eq!(s.recent_submissions(10).await.unwrap().len(), 1);
    }
}
