// src/store/sqlite.rs
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;

use super::ContentStore;
use crate::errors::StoreError;
use crate::model::{
    Category, ContentItem, ContentSource, InsertOutcome, ItemId, NewContentItem, SourceId,
    SourceSeed, SubmissionRecord, SubmissionStatus,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL DEFAULT 'blog',
    is_active INTEGER NOT NULL DEFAULT 1,
    max_items INTEGER NOT NULL DEFAULT 3,
    priority INTEGER NOT NULL DEFAULT 1,
    feed_url TEXT,
    last_pulled_at TEXT
);

CREATE TABLE IF NOT EXISTS content_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '[]',
    author TEXT,
    published_at TEXT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    source_name TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    relevance_score REAL,
    category TEXT,
    is_processed INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_unprocessed ON content_items(is_processed, relevance_score);

CREATE TABLE IF NOT EXISTS daily_quota (
    date TEXT PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES content_items(id),
    job_id TEXT,
    status TEXT NOT NULL,
    dispatched_at TEXT NOT NULL,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_submissions_item ON submissions(item_id);
"#;

const ITEM_COLUMNS: &str = "id, url, title, body, summary, keywords, author, published_at, \
     source_id, source_name, fingerprint, relevance_score, category, is_processed, status, \
     discovered_at";

const SOURCE_COLUMNS: &str =
    "id, name, url, kind, is_active, max_items, priority, feed_url, last_pulled_at";

/// SQLite-backed store. The connection runs on its own thread; uniqueness and
/// check-and-set semantics come from single statements or IMMEDIATE transactions.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp `{s}`: {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(parse_ts).transpose()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Raw column values, converted to domain types outside the connection thread.
struct ItemRow {
    id: i64,
    url: String,
    title: String,
    body: String,
    summary: String,
    keywords: String,
    author: Option<String>,
    published_at: Option<String>,
    source_id: i64,
    source_name: String,
    fingerprint: String,
    relevance_score: Option<f64>,
    category: Option<String>,
    is_processed: bool,
    status: String,
    discovered_at: String,
}

fn item_row(row: &Row) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        summary: row.get(4)?,
        keywords: row.get(5)?,
        author: row.get(6)?,
        published_at: row.get(7)?,
        source_id: row.get(8)?,
        source_name: row.get(9)?,
        fingerprint: row.get(10)?,
        relevance_score: row.get(11)?,
        category: row.get(12)?,
        is_processed: row.get::<_, i64>(13)? != 0,
        status: row.get(14)?,
        discovered_at: row.get(15)?,
    })
}

fn item_from_row(r: ItemRow) -> Result<ContentItem, StoreError> {
    let keywords: Vec<String> = serde_json::from_str(&r.keywords)
        .map_err(|e| StoreError::Corrupt(format!("item {} keywords: {e}", r.id)))?;
    let category = match r.category.as_deref() {
        None => None,
        Some(c) => Some(
            Category::parse(c)
                .ok_or_else(|| StoreError::Corrupt(format!("item {} category `{c}`", r.id)))?,
        ),
    };
    let status = SubmissionStatus::parse(&r.status)
        .ok_or_else(|| StoreError::Corrupt(format!("item {} status `{}`", r.id, r.status)))?;
    Ok(ContentItem {
        id: r.id,
        url: r.url,
        title: r.title,
        body: r.body,
        summary: r.summary,
        keywords,
        author: r.author,
        published_at: parse_opt_ts(r.published_at)?,
        source_id: r.source_id,
        source_name: r.source_name,
        fingerprint: r.fingerprint,
        relevance_score: r.relevance_score,
        category,
        processed: r.is_processed,
        status,
        discovered_at: parse_ts(&r.discovered_at)?,
    })
}

type SourceRow = (i64, String, String, String, i64, i64, i64, Option<String>, Option<String>);

fn source_row(row: &Row) -> rusqlite::Result<SourceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn source_from_row(r: SourceRow) -> Result<ContentSource, StoreError> {
    let (id, name, url, kind, active, max_items, priority, feed_url, last_pulled_at) = r;
    Ok(ContentSource {
        id,
        name,
        url,
        kind,
        active: active != 0,
        max_items: u32::try_from(max_items)
            .map_err(|_| StoreError::Corrupt(format!("source {id} max_items {max_items}")))?,
        priority: u8::try_from(priority)
            .map_err(|_| StoreError::Corrupt(format!("source {id} priority {priority}")))?,
        feed_url,
        last_pulled_at: parse_opt_ts(last_pulled_at)?,
    })
}

#[async_trait::async_trait]
impl ContentStore for SqliteStore {
    async fn list_active_sources(&self) -> Result<Vec<ContentSource>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = 1 ORDER BY priority, id"
                ))?;
                let rows = stmt
                    .query_map([], source_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(source_from_row).collect()
    }

    async fn list_sources(&self) -> Result<Vec<ContentSource>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id"))?;
                let rows = stmt
                    .query_map([], source_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(source_from_row).collect()
    }

    async fn upsert_source(&self, seed: &SourceSeed) -> Result<SourceId, StoreError> {
        let seed = seed.clone();
        let id = self
            .conn
            .call(move |conn| {
                let id: i64 = conn.query_row(
                    r#"INSERT INTO sources (name, url, kind, is_active, max_items, priority, feed_url)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(url) DO UPDATE SET
                           name = excluded.name,
                           kind = excluded.kind,
                           is_active = excluded.is_active,
                           max_items = excluded.max_items,
                           priority = excluded.priority,
                           feed_url = excluded.feed_url
                       RETURNING id"#,
                    params![
                        seed.name,
                        seed.url,
                        seed.kind,
                        seed.active,
                        seed.max_items,
                        seed.priority,
                        seed.feed_url,
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    async fn touch_source(&self, id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE sources SET last_pulled_at = ?1 WHERE id = ?2",
                    params![at, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn url_exists(&self, canonical_url: &str) -> Result<bool, StoreError> {
        let url = canonical_url.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM content_items WHERE url = ?1",
                        params![url],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(exists)
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let fp = fingerprint.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM content_items WHERE fingerprint = ?1",
                        params![fp],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(exists)
    }

    async fn insert_item(&self, item: &NewContentItem) -> Result<InsertOutcome, StoreError> {
        let item = item.clone();
        let keywords = serde_json::to_string(&item.keywords)
            .map_err(|e| StoreError::Corrupt(format!("keywords: {e}")))?;
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let url_taken = tx
                    .query_row(
                        "SELECT 1 FROM content_items WHERE url = ?1",
                        params![item.url],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if url_taken {
                    return Ok(InsertOutcome::DuplicateUrl);
                }
                let inserted = tx.execute(
                    r#"INSERT OR IGNORE INTO content_items
                       (url, title, body, summary, keywords, author, published_at, source_id,
                        source_name, fingerprint, relevance_score, category, discovered_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
                    params![
                        item.url,
                        item.title,
                        item.body,
                        item.summary,
                        keywords,
                        item.author,
                        item.published_at.map(|dt| dt.to_rfc3339()),
                        item.source_id,
                        item.source_name,
                        item.fingerprint,
                        item.relevance_score,
                        item.category.as_str(),
                        item.discovered_at.to_rfc3339(),
                    ],
                )?;
                if inserted == 0 {
                    return Ok(InsertOutcome::DuplicateFingerprint);
                }
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(InsertOutcome::Inserted(id))
            })
            .await?;
        Ok(outcome)
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>, StoreError> {
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {ITEM_COLUMNS} FROM content_items WHERE id = ?1"),
                        params![id],
                        item_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(item_from_row).transpose()
    }

    async fn mark_processed(&self, id: ItemId) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE content_items SET is_processed = 1 WHERE id = ?1 AND is_processed = 0",
                    params![id],
                )?;
                Ok(n)
            })
            .await?;
        Ok(changed == 1)
    }

    async fn get_unprocessed_items(&self, min_score: f64) -> Result<Vec<ContentItem>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM content_items \
                     WHERE is_processed = 0 AND relevance_score IS NOT NULL AND relevance_score >= ?1 \
                     ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map(params![min_score], item_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(item_from_row).collect()
    }

    async fn get_daily_count(&self, date: NaiveDate) -> Result<u32, StoreError> {
        let key = date_key(date);
        let count = self
            .conn
            .call(move |conn| {
                let count: Option<u32> = conn
                    .query_row(
                        "SELECT count FROM daily_quota WHERE date = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(count.unwrap_or(0))
            })
            .await?;
        Ok(count)
    }

    async fn increment_daily_count(
        &self,
        date: NaiveDate,
        n: u32,
        limit: u32,
    ) -> Result<u32, StoreError> {
        let key = date_key(date);
        let applied = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "INSERT INTO daily_quota (date, count) VALUES (?1, 0) ON CONFLICT(date) DO NOTHING",
                    params![key],
                )?;
                let count: u32 = tx.query_row(
                    "SELECT count FROM daily_quota WHERE date = ?1",
                    params![key],
                    |row| row.get(0),
                )?;
                let applied = n.min(limit.saturating_sub(count));
                if applied > 0 {
                    tx.execute(
                        "UPDATE daily_quota SET count = count + ?1 WHERE date = ?2",
                        params![applied, key],
                    )?;
                }
                tx.commit()?;
                Ok(applied)
            })
            .await?;
        Ok(applied)
    }

    async fn release_daily_count(&self, date: NaiveDate, n: u32) -> Result<(), StoreError> {
        let key = date_key(date);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE daily_quota SET count = MAX(count - ?1, 0) WHERE date = ?2",
                    params![n, key],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO submissions (item_id, job_id, status, dispatched_at, error) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.item_id,
                        record.job_id,
                        record.status.as_str(),
                        record.dispatched_at.to_rfc3339(),
                        record.error,
                    ],
                )?;
                tx.execute(
                    "UPDATE content_items SET status = ?1 WHERE id = ?2",
                    params![record.status.as_str(), record.item_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn recent_submissions(&self, limit: usize) -> Result<Vec<SubmissionRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT item_id, job_id, status, dispatched_at, error FROM submissions \
                     ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(item_id, job_id, status, dispatched_at, error)| {
                Ok(SubmissionRecord {
                    item_id,
                    job_id,
                    status: SubmissionStatus::parse(&status).ok_or_else(|| {
                        StoreError::Corrupt(format!("submission status `{status}`"))
                    })?,
                    dispatched_at: parse_ts(&dispatched_at)?,
                    error,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, fp: &str, score: f64, source_id: i64) -> NewContentItem {
        NewContentItem {
            url: url.into(),
            title: "Title".into(),
            body: "body".into(),
            summary: "summary".into(),
            keywords: vec!["ai".into(), "automation".into()],
            author: Some("Jane".into()),
            published_at: Some(Utc::now()),
            source_id,
            source_name: "Blog".into(),
            fingerprint: fp.into(),
            relevance_score: score,
            category: Category::CaseStudy,
            discovered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn roundtrip_item_and_uniqueness() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let src = s
            .upsert_source(&SourceSeed::new("Blog", "https://blog.example.com"))
            .await
            .unwrap();

        let InsertOutcome::Inserted(id) = s.insert_item(&item("u1", "f1", 0.7, src)).await.unwrap()
        else {
            panic!("expected insert");
        };
        assert_eq!(
            s.insert_item(&item("u1", "f9", 0.7, src)).await.unwrap(),
            InsertOutcome::DuplicateUrl
        );
        assert_eq!(
            s.insert_item(&item("u2", "f1", 0.7, src)).await.unwrap(),
            InsertOutcome::DuplicateFingerprint
        );

        let got = s.get_item(id).await.unwrap().unwrap();
        assert_eq!(got.keywords, vec!["ai", "automation"]);
        assert_eq!(got.category, Some(Category::CaseStudy));
        assert_eq!(got.status, SubmissionStatus::Pending);
        assert!(s.url_exists("u1").await.unwrap());
        assert!(s.fingerprint_exists("f1").await.unwrap());
        assert!(!s.url_exists("u2").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_source_is_keyed_by_url() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let a = s
            .upsert_source(&SourceSeed::new("Blog", "https://blog.example.com"))
            .await
            .unwrap();
        let b = s
            .upsert_source(&SourceSeed::new("Blog v2", "https://blog.example.com").inactive())
            .await
            .unwrap();
        assert_eq!(a, b);
        assert!(s.list_active_sources().await.unwrap().is_empty());
        let all = s.list_sources().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Blog v2");
    }

    #[tokio::test]
    async fn processed_flag_and_unprocessed_filter() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let src = s
            .upsert_source(&SourceSeed::new("Blog", "https://blog.example.com"))
            .await
            .unwrap();
        s.insert_item(&item("u1", "f1", 0.4, src)).await.unwrap();
        let InsertOutcome::Inserted(id2) = s.insert_item(&item("u2", "f2", 0.9, src)).await.unwrap()
        else {
            panic!("expected insert");
        };

        let pool = s.get_unprocessed_items(0.5).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, id2);

        assert!(s.mark_processed(id2).await.unwrap());
        assert!(!s.mark_processed(id2).await.unwrap());
        assert!(s.get_unprocessed_items(0.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn daily_counter_never_exceeds_limit() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(s.increment_daily_count(d, 20, 30).await.unwrap(), 20);
        assert_eq!(s.increment_daily_count(d, 20, 30).await.unwrap(), 10);
        assert_eq!(s.get_daily_count(d).await.unwrap(), 30);
        s.release_daily_count(d, 5).await.unwrap();
        assert_eq!(s.get_daily_count(d).await.unwrap(), 25);
        let other = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(s.get_daily_count(other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submissions_are_listed_newest_first() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let src = s
            .upsert_source(&SourceSeed::new("Blog", "https://blog.example.com"))
            .await
            .unwrap();
        let InsertOutcome::Inserted(id) = s.insert_item(&item("u1", "f1", 0.9, src)).await.unwrap()
        else {
            panic!("expected insert");
        };
        for (job, status) in [
            (Some("job-1".to_string()), SubmissionStatus::Submitted),
            (None, SubmissionStatus::DispatchFailed),
        ] {
            s.record_submission(&SubmissionRecord {
                item_id: id,
                job_id: job,
                status,
                dispatched_at: Utc::now(),
                error: None,
            })
            .await
            .unwrap();
        }
        let recent = s.recent_submissions(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, SubmissionStatus::DispatchFailed);
        assert_eq!(
            s.get_item(id).await.unwrap().unwrap().status,
            SubmissionStatus::DispatchFailed
        );
    }
}
