//! Bounded in-memory log of run summaries for the status surface.

use std::sync::Mutex;

use crate::orchestrator::RunSummary;

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Vec<RunSummary>>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, summary: RunSummary) {
        let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.push(summary);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<RunSummary> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.last().cloned()
    }

    /// Most recent `n` runs, oldest first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunSummary> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }
}
