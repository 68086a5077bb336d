//! Content curator service entrypoint.
//! Boots the Axum status API, the periodic pipeline scheduler and the
//! Prometheus endpoint on top of the configured store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use content_curator::api::{create_router, AppState};
use content_curator::config::{CuratorConfig, DEFAULT_CONFIG_PATH};
use content_curator::history::RunHistory;
use content_curator::ingest::rss::RssFetcher;
use content_curator::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use content_curator::orchestrator::Pipeline;
use content_curator::relevance::{start_hot_reload_thread, RelevanceEngine, RelevanceHandle};
use content_curator::store::{ContentStore, InMemoryStore, SqliteStore};
use content_curator::submit::HttpPlatformClient;
use content_curator::telemetry::Telemetry;

/// Compact logs by default; CURATOR_LOG_JSON=1 switches to JSON lines.
/// Uses `try_init` so a subscriber installed by the runtime wins.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("content_curator=info,warn"));
    let json = std::env::var("CURATOR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

async fn open_store(db_path: &str) -> anyhow::Result<Arc<dyn ContentStore>> {
    if db_path.trim().is_empty() {
        tracing::info!("using in-memory store");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let path = Path::new(db_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating store directory {}", dir.display()))?;
    }
    let store = SqliteStore::open(db_path)
        .await
        .with_context(|| format!("opening sqlite store at {}", path.display()))?;
    tracing::info!(path = %path.display(), "sqlite store ready");
    Ok(Arc::new(store))
}

async fn build() -> anyhow::Result<axum::Router> {
    let (cfg, cfg_path) = CuratorConfig::load_default()?;
    tracing::info!(
        config = ?cfg_path,
        sources = cfg.sources.len(),
        daily_limit = cfg.pipeline.daily_limit,
        "configuration loaded"
    );

    let telemetry = Telemetry::init()?;

    let store = open_store(&cfg.store.db_path).await?;
    for seed in &cfg.sources {
        store.upsert_source(seed).await?;
    }

    if !cfg.platform.is_configured() {
        tracing::warn!("generation platform not configured; dispatches will fail");
    }
    let platform = Arc::new(HttpPlatformClient::new(cfg.platform.clone()));
    let fetcher = Arc::new(RssFetcher::new(
        cfg.fetch.clone(),
        cfg.pipeline.feed_freshness_days,
    )?);

    let relevance = RelevanceHandle::new(RelevanceEngine::new(cfg.scoring.clone())?);
    let reload_path = cfg_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    start_hot_reload_thread(relevance.clone(), reload_path);

    let history = Arc::new(RunHistory::with_capacity(cfg.pipeline.run_history));
    let pipeline = Arc::new(Pipeline::new(
        &cfg, store, fetcher, platform, relevance, history,
    ));

    let cancel = CancellationToken::new();
    if cfg.pipeline.scheduler_enabled {
        spawn_scheduler(
            pipeline.clone(),
            SchedulerCfg::every_minutes(cfg.pipeline.interval_minutes),
            cancel.clone(),
        );
    } else {
        tracing::info!("scheduler disabled; runs only via POST /run");
    }

    let router = create_router(AppState::new(pipeline, cancel)).merge(telemetry.router());
    Ok(router)
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let router = build().await.map_err(shuttle_runtime::Error::Custom)?;
    Ok(router.into())
}
