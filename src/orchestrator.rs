// src/orchestrator.rs
//! One pipeline run: fetch → validate → score → select → quota → submit → report.
//!
//! Source failures are isolated to that source. Store failures abort the run,
//! but the run is still reported and any claimed quota is settled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CuratorConfig, PipelineSettings};
use crate::dedup::{fingerprint, normalize_url, Deduplicator};
use crate::errors::{PipelineError, Rejection, StoreError};
use crate::history::RunHistory;
use crate::ingest::extract_keywords;
use crate::ingest::types::{DocumentFetcher, RawDocument};
use crate::model::{ContentSource, InsertOutcome, NewContentItem, SourceId};
use crate::quota::{QuotaManager, Reservation};
use crate::relevance::{RelevanceHandle, ScoreInput};
use crate::select::{Selected, Selector};
use crate::store::ContentStore;
use crate::submit::platform::GenerationPlatform;
use crate::submit::{SubmissionCoordinator, SubmitOutcome};
use crate::validate::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Fetching,
    Validating,
    Scoring,
    Selecting,
    QuotaCheck,
    Submitting,
    Reporting,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub name: String,
    pub kind: String,
    pub discovered: usize,
    pub rejected: usize,
    pub deduplicated: usize,
    pub fetch_errors: usize,
    pub scored: usize,
    pub selected: usize,
    pub submitted: usize,
    pub dispatch_failed: usize,
    pub skipped: usize,
    pub error: Option<String>,
}

impl SourceReport {
    fn for_source(s: &ContentSource) -> Self {
        Self {
            source_id: s.id,
            name: s.name.clone(),
            kind: s.kind.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub discovered: usize,
    pub rejected: usize,
    pub deduplicated: usize,
    pub fetch_errors: usize,
    pub scored: usize,
    pub selected: usize,
    pub submitted: usize,
    pub dispatch_failed: usize,
    pub skipped: usize,
}

impl RunTotals {
    fn from_reports(reports: &[SourceReport]) -> Self {
        reports.iter().fold(Self::default(), |mut t, r| {
            t.discovered += r.discovered;
            t.rejected += r.rejected;
            t.deduplicated += r.deduplicated;
            t.fetch_errors += r.fetch_errors;
            t.scored += r.scored;
            t.selected += r.selected;
            t.submitted += r.submitted;
            t.dispatch_failed += r.dispatch_failed;
            t.skipped += r.skipped;
            t
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub date: NaiveDate,
    /// Last stage entered before reporting.
    pub stopped_at: RunStage,
    pub cancelled: bool,
    pub quota_exhausted: bool,
    pub remaining_quota: u32,
    pub duration_ms: u64,
    pub sources: Vec<SourceReport>,
    pub totals: RunTotals,
    pub error: Option<String>,
}

/// Mutable bookkeeping for one run.
struct RunState {
    stage: RunStage,
    cancelled: bool,
    quota_exhausted: bool,
    reports: Vec<SourceReport>,
    reservation: Option<Reservation>,
    dispatched: u32,
}

impl RunState {
    fn new(sources: &[ContentSource]) -> Self {
        Self {
            stage: RunStage::Idle,
            cancelled: false,
            quota_exhausted: false,
            reports: sources.iter().map(SourceReport::for_source).collect(),
            reservation: None,
            dispatched: 0,
        }
    }

    /// Report for an item's source; sources deactivated since the item was
    /// stored get a report on first use.
    fn report_for(&mut self, source_id: SourceId, name: &str) -> &mut SourceReport {
        let idx = match self.reports.iter().position(|r| r.source_id == source_id) {
            Some(i) => i,
            None => {
                self.reports.push(SourceReport {
                    source_id,
                    name: name.to_string(),
                    ..Default::default()
                });
                self.reports.len() - 1
            }
        };
        &mut self.reports[idx]
    }
}

/// A fetched document that passed the pre-fetch checks.
struct Candidate {
    report: usize,
    source_id: SourceId,
    source_name: String,
    doc: RawDocument,
}

struct Validated {
    candidate: Candidate,
    fingerprint: String,
}

pub struct Pipeline {
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    relevance: RelevanceHandle,
    validator: Validator,
    selector: Selector,
    quota: QuotaManager,
    coordinator: SubmissionCoordinator,
    history: Arc<RunHistory>,
    settings: PipelineSettings,
    next_run_id: AtomicU64,
}

impl Pipeline {
    pub fn new(
        cfg: &CuratorConfig,
        store: Arc<dyn ContentStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        platform: Arc<dyn GenerationPlatform>,
        relevance: RelevanceHandle,
        history: Arc<RunHistory>,
    ) -> Self {
        Self {
            quota: QuotaManager::new(store.clone(), cfg.pipeline.daily_limit),
            coordinator: SubmissionCoordinator::new(store.clone(), platform),
            validator: Validator::new(cfg.validation.clone()),
            selector: Selector::new(cfg.selection.clone()),
            settings: cfg.pipeline.clone(),
            store,
            fetcher,
            relevance,
            history,
            next_run_id: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn quota(&self) -> &QuotaManager {
        &self.quota
    }

    pub fn history(&self) -> &Arc<RunHistory> {
        &self.history
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, PipelineError> {
        self.run_at(Utc::now(), cancel).await
    }

    /// Run with an explicit clock. The quota day is `now`'s UTC date.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let t0 = Instant::now();
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("curator_runs_total").increment(1);

        let sources = self.store.list_active_sources().await?;
        if sources.is_empty() {
            warn!(target: "pipeline", run_id, "no active sources; run aborted");
            return Err(PipelineError::NoActiveSources);
        }
        info!(target: "pipeline", run_id, sources = sources.len(), "run started");

        let today = now.date_naive();
        let mut st = RunState::new(&sources);
        let mut error = self.drive(&sources, &mut st, now, today, cancel).await.err();
        let stopped_at = st.stage;

        // Reporting
        st.stage = RunStage::Reporting;
        if let Some(res) = st.reservation.take() {
            if let Err(e) = self.quota.settle(res, st.dispatched).await {
                error.get_or_insert(e);
            }
        }
        let remaining_quota = match self.quota.remaining_capacity(today).await {
            Ok(r) => r,
            Err(e) => {
                error.get_or_insert(e);
                0
            }
        };

        let duration_ms = t0.elapsed().as_millis() as u64;
        let finished_at = Utc::now();
        let totals = RunTotals::from_reports(&st.reports);
        let summary = RunSummary {
            run_id,
            started_at: now,
            finished_at,
            date: today,
            stopped_at,
            cancelled: st.cancelled,
            quota_exhausted: st.quota_exhausted,
            remaining_quota,
            duration_ms,
            sources: st.reports,
            totals,
            error: error.as_ref().map(|e| e.to_string()),
        };

        histogram!("curator_run_duration_ms").record(duration_ms as f64);
        gauge!("curator_last_run_ts").set(finished_at.timestamp() as f64);
        info!(
            target: "pipeline",
            run_id,
            ?stopped_at,
            cancelled = summary.cancelled,
            quota_exhausted = summary.quota_exhausted,
            remaining_quota,
            discovered = summary.totals.discovered,
            rejected = summary.totals.rejected,
            deduplicated = summary.totals.deduplicated,
            scored = summary.totals.scored,
            selected = summary.totals.selected,
            submitted = summary.totals.submitted,
            dispatch_failed = summary.totals.dispatch_failed,
            duration_ms,
            "run finished"
        );
        self.history.push(summary.clone());

        match error {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }

    /// Enter `stage` unless the run was cancelled.
    fn enter(st: &mut RunState, stage: RunStage, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            st.cancelled = true;
            info!(target: "pipeline", ?stage, "cancelled before stage");
            return false;
        }
        st.stage = stage;
        debug!(target: "pipeline", ?stage, "stage");
        true
    }

    fn reject(report: &mut SourceReport, url: &str, r: &Rejection) {
        report.rejected += 1;
        counter!("curator_rejected_total", "reason" => r.reason()).increment(1);
        info!(target: "validate", %url, reason = r.reason(), detail = %r, "rejected");
    }

    fn deduplicated(report: &mut SourceReport, url: &str, key: &'static str) {
        report.deduplicated += 1;
        counter!("curator_deduplicated_total", "key" => key).increment(1);
        debug!(target: "dedup", %url, key, "duplicate");
    }

    async fn drive(
        &self,
        sources: &[ContentSource],
        st: &mut RunState,
        now: DateTime<Utc>,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let mut dedup = Deduplicator::new(self.store.as_ref());

        if !Self::enter(st, RunStage::Fetching, cancel) {
            return Ok(());
        }
        let mut candidates = Vec::new();
        for (idx, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                st.cancelled = true;
                return Ok(());
            }
            let Some(found) = self
                .fetch_source(source, &mut dedup, &mut st.reports[idx])
                .await?
            else {
                continue;
            };
            candidates.extend(found.into_iter().map(|doc| Candidate {
                report: idx,
                source_id: source.id,
                source_name: source.name.clone(),
                doc,
            }));
            self.store.touch_source(source.id, now).await?;
        }

        if !Self::enter(st, RunStage::Validating, cancel) {
            return Ok(());
        }
        let mut validated = Vec::with_capacity(candidates.len());
        for c in candidates {
            let report = &mut st.reports[c.report];
            if let Err(r) = self.validator.validate(&c.doc) {
                Self::reject(report, &c.doc.url, &r);
                continue;
            }
            let fp = fingerprint(&c.doc.body);
            if dedup.fingerprint_is_duplicate(&fp).await? {
                Self::deduplicated(report, &c.doc.url, "fingerprint");
                continue;
            }
            validated.push(Validated {
                candidate: c,
                fingerprint: fp,
            });
        }

        if !Self::enter(st, RunStage::Scoring, cancel) {
            return Ok(());
        }
        for v in validated {
            let Validated {
                candidate: c,
                fingerprint,
            } = v;
            let doc = c.doc;
            let keywords = extract_keywords(
                &doc.tags,
                &format!("{}\n{}", doc.title, doc.body),
                self.settings.max_keywords,
            );
            let rel = self.relevance.score(
                &ScoreInput {
                    title: &doc.title,
                    summary: &doc.summary,
                    body: &doc.body,
                    keywords: &keywords,
                    published_at: doc.published_at,
                },
                now,
            );
            let category = self.relevance.categorize(&doc.title, &doc.summary);
            let url = doc.url.clone();
            let new = NewContentItem {
                url: doc.url,
                title: doc.title,
                body: doc.body,
                summary: doc.summary,
                keywords,
                author: doc.author,
                published_at: doc.published_at,
                source_id: c.source_id,
                source_name: c.source_name,
                fingerprint,
                relevance_score: rel.score,
                category,
                discovered_at: now,
            };
            let report = &mut st.reports[c.report];
            match self.store.insert_item(&new).await? {
                InsertOutcome::Inserted(id) => {
                    report.scored += 1;
                    counter!("curator_scored_total").increment(1);
                    debug!(target: "pipeline", id, %url, score = rel.score, %category, "stored");
                }
                InsertOutcome::DuplicateUrl => Self::deduplicated(report, &url, "url"),
                InsertOutcome::DuplicateFingerprint => {
                    Self::deduplicated(report, &url, "fingerprint")
                }
            }
        }

        if !Self::enter(st, RunStage::Selecting, cancel) {
            return Ok(());
        }
        let remaining = self.quota.remaining_capacity(today).await?;
        if remaining == 0 {
            st.quota_exhausted = true;
            info!(target: "pipeline", %today, "daily quota exhausted; skipping selection");
            return Ok(());
        }
        let pool = self
            .store
            .get_unprocessed_items(self.settings.min_relevance)
            .await?;
        let pool_size = pool.len();
        let mut batch: Vec<Selected> =
            self.selector
                .select(pool, self.settings.max_items_per_run, remaining);
        debug!(target: "pipeline", pool_size, selected = batch.len(), "selection done");

        if !Self::enter(st, RunStage::QuotaCheck, cancel) {
            return Ok(());
        }
        if batch.is_empty() {
            return Ok(());
        }
        let reservation = self.quota.reserve(today, batch.len() as u32).await?;
        st.reservation = Some(reservation);
        if reservation.granted == 0 {
            st.quota_exhausted = true;
            info!(target: "pipeline", %today, "no quota could be reserved");
            return Ok(());
        }
        batch.truncate(reservation.granted as usize);
        for s in &batch {
            st.report_for(s.item.source_id, &s.item.source_name).selected += 1;
        }

        if !Self::enter(st, RunStage::Submitting, cancel) {
            return Ok(());
        }
        for s in &batch {
            if cancel.is_cancelled() {
                st.cancelled = true;
                info!(target: "pipeline", "cancelled during submission; remaining items left for later");
                break;
            }
            let outcome = self.coordinator.submit(&s.item).await?;
            let accepted = outcome.is_submitted();
            if accepted {
                st.dispatched += 1;
            }
            let report = st.report_for(s.item.source_id, &s.item.source_name);
            match outcome {
                SubmitOutcome::Skipped => report.skipped += 1,
                SubmitOutcome::Dispatched(_) if accepted => report.submitted += 1,
                SubmitOutcome::Dispatched(_) => report.dispatch_failed += 1,
            }
        }
        Ok(())
    }

    /// Discover one source and keep the documents worth fetching in full.
    /// Fetch failures are recorded on the report and never propagate.
    async fn fetch_source(
        &self,
        source: &ContentSource,
        dedup: &mut Deduplicator<'_>,
        report: &mut SourceReport,
    ) -> Result<Option<Vec<RawDocument>>, StoreError> {
        let docs = match self.fetcher.discover(source).await {
            Ok(d) => d,
            Err(e) => {
                report.fetch_errors += 1;
                report.error = Some(e.to_string());
                counter!("curator_fetch_errors_total", "stage" => "discover").increment(1);
                warn!(target: "ingest", source = %source.name, error = %e, "source fetch failed; skipping");
                return Ok(None);
            }
        };
        report.discovered += docs.len();
        counter!("curator_discovered_total").increment(docs.len() as u64);

        let cap = source.max_items.min(self.settings.max_items_per_source) as usize;
        let min_body = self.validator.rules().min_body_chars;
        let mut out = Vec::new();
        for doc in docs {
            if out.len() >= cap {
                break;
            }
            let canonical = match normalize_url(&doc.url) {
                Ok(u) => u,
                Err(r) => {
                    Self::reject(report, &doc.url, &r);
                    continue;
                }
            };
            if let Err(r) = self.validator.check_url_and_title(&canonical, &doc.title) {
                Self::reject(report, &canonical, &r);
                continue;
            }
            if dedup.url_is_duplicate(&canonical).await? {
                Self::deduplicated(report, &canonical, "url");
                continue;
            }

            let doc = if doc.body.chars().count() < min_body {
                match self.fetcher.fetch_document(&doc.url).await {
                    Ok(full) => doc.merge_full(full),
                    Err(e) => {
                        report.fetch_errors += 1;
                        counter!("curator_fetch_errors_total", "stage" => "document").increment(1);
                        warn!(target: "ingest", url = %canonical, error = %e, "document fetch failed; skipping");
                        continue;
                    }
                }
            } else {
                doc
            };
            out.push(RawDocument {
                url: canonical,
                ..doc
            });
        }
        Ok(Some(out))
    }
}
