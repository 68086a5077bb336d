// src/errors.rs
//! Error taxonomy. Only `PipelineError` aborts a run; everything else is
//! isolated to one item or one source.

use thiserror::Error;

/// Why a fetched document was discarded. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("url could not be parsed")]
    InvalidUrl,

    #[error("url matches index pattern `{0}`")]
    IndexUrl(&'static str),

    #[error("title looks like an index page")]
    IndexTitle,

    #[error("body too short ({len} < {min} chars)")]
    BodyTooShort { len: usize, min: usize },

    #[error("link-dense listing ({links} links in {len} chars)")]
    LinkDense { links: usize, len: usize },

    #[error("too few paragraphs ({found} < {min})")]
    TooFewParagraphs { found: usize, min: usize },
}

impl Rejection {
    /// Stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::InvalidUrl => "invalid_url",
            Rejection::IndexUrl(_) => "index_url",
            Rejection::IndexTitle => "index_title",
            Rejection::BodyTooShort { .. } => "body_too_short",
            Rejection::LinkDense { .. } => "link_dense",
            Rejection::TooFewParagraphs { .. } => "too_few_paragraphs",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("platform response had no job id")]
    MissingJobId,

    #[error("payload mapping failed: {0}")]
    Mapping(String),

    /// The job was initiated but could not be executed. It exists on the
    /// platform under `job_id`.
    #[error("execute failed for job {job_id}: {source}")]
    Execute {
        job_id: String,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    /// Platform job id when the failure happened after a job was created.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            DispatchError::Execute { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no active sources configured")]
    NoActiveSources,

    #[error(transparent)]
    Store(#[from] StoreError),
}
