// src/quota.rs
//! Daily submission quota, keyed by UTC calendar day.
//!
//! Slots are claimed up front with the store's capped increment and the unused
//! part is given back once dispatch finishes, so the day's count ends at the
//! number actually dispatched and concurrent runs can never overshoot the limit.

use std::sync::Arc;

use chrono::NaiveDate;
use metrics::gauge;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::model::DailyQuota;
use crate::store::ContentStore;

/// Slots claimed for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a reservation must be settled or its unused slots stay claimed"]
pub struct Reservation {
    pub date: NaiveDate,
    pub granted: u32,
}

#[derive(Clone)]
pub struct QuotaManager {
    store: Arc<dyn ContentStore>,
    daily_limit: u32,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn ContentStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn snapshot(&self, date: NaiveDate) -> Result<DailyQuota, StoreError> {
        let count = self.store.get_daily_count(date).await?;
        Ok(DailyQuota {
            date,
            count,
            limit: self.daily_limit,
        })
    }

    pub async fn remaining_capacity(&self, date: NaiveDate) -> Result<u32, StoreError> {
        let remaining = self.snapshot(date).await?.remaining();
        gauge!("curator_quota_remaining").set(remaining as f64);
        Ok(remaining)
    }

    /// Claim up to `n` slots. `granted` may be smaller than `n`, or zero.
    pub async fn reserve(&self, date: NaiveDate, n: u32) -> Result<Reservation, StoreError> {
        let granted = if n == 0 {
            0
        } else {
            self.store
                .increment_daily_count(date, n, self.daily_limit)
                .await?
        };
        debug!(target: "quota", %date, requested = n, granted, "reserved");
        Ok(Reservation { date, granted })
    }

    /// Release the slots that were not dispatched.
    pub async fn settle(&self, reservation: Reservation, dispatched: u32) -> Result<(), StoreError> {
        let unused = reservation.granted.saturating_sub(dispatched);
        if unused > 0 {
            self.store.release_daily_count(reservation.date, unused).await?;
        }
        let remaining = self.remaining_capacity(reservation.date).await?;
        info!(
            target: "quota",
            date = %reservation.date,
            granted = reservation.granted,
            dispatched,
            released = unused,
            remaining,
            "quota settled"
        );
        Ok(())
    }
}
