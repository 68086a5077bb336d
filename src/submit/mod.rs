// src/submit/mod.rs
//! At-most-once submission: win the processed mark, then dispatch.

pub mod platform;

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::model::{ContentItem, SubmissionRecord, SubmissionStatus};
use crate::store::ContentStore;
use platform::{DispatchPayload, GenerationPlatform};

pub use platform::{HttpPlatformClient, PlatformConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Another caller already claimed the item; nothing was dispatched.
    Skipped,
    Dispatched(SubmissionRecord),
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Dispatched(r) if r.status == SubmissionStatus::Submitted)
    }
}

#[derive(Clone)]
pub struct SubmissionCoordinator {
    store: Arc<dyn ContentStore>,
    platform: Arc<dyn GenerationPlatform>,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<dyn ContentStore>, platform: Arc<dyn GenerationPlatform>) -> Self {
        Self { store, platform }
    }

    /// Claim and dispatch one item. A failed dispatch is recorded and never
    /// rolls back the processed flag, so the item is not offered again.
    pub async fn submit(&self, item: &ContentItem) -> Result<SubmitOutcome, StoreError> {
        if !self.store.mark_processed(item.id).await? {
            info!(target: "submit", item_id = item.id, "already processed; skipping");
            return Ok(SubmitOutcome::Skipped);
        }

        let payload = DispatchPayload::from_item(item);
        let record = match self.platform.dispatch(&payload).await {
            Ok(job_id) => {
                counter!("curator_submitted_total").increment(1);
                info!(
                    target: "submit",
                    item_id = item.id,
                    %job_id,
                    platform = self.platform.name(),
                    "dispatched"
                );
                SubmissionRecord {
                    item_id: item.id,
                    job_id: Some(job_id),
                    status: SubmissionStatus::Submitted,
                    dispatched_at: Utc::now(),
                    error: None,
                }
            }
            Err(e) => {
                counter!("curator_dispatch_failures_total").increment(1);
                warn!(
                    target: "submit",
                    item_id = item.id,
                    job_id = e.job_id().unwrap_or("-"),
                    error = %e,
                    "dispatch failed"
                );
                SubmissionRecord {
                    item_id: item.id,
                    job_id: e.job_id().map(str::to_string),
                    status: SubmissionStatus::DispatchFailed,
                    dispatched_at: Utc::now(),
                    error: Some(e.to_string()),
                }
            }
        };

        // The dispatch already happened; losing the record must not turn into a retry.
        if let Err(e) = self.store.record_submission(&record).await {
            warn!(target: "submit", item_id = item.id, error = %e, "failed to persist submission record");
        }
        Ok(SubmitOutcome::Dispatched(record))
    }
}
