// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod history;
pub mod ingest;
pub mod model;
pub mod orchestrator;
pub mod quota;
pub mod relevance;
pub mod select;
pub mod store;
pub mod submit;
pub mod telemetry;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::CuratorConfig;
pub use crate::errors::{PipelineError, StoreError};
pub use crate::orchestrator::{Pipeline, RunSummary};
