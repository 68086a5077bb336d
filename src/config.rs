// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::ingest::rss::FetcherConfig;
use crate::model::SourceSeed;
use crate::relevance::ScoringConfig;
use crate::select::SelectionPolicy;
use crate::submit::PlatformConfig;
use crate::validate::ValidationRules;

pub const ENV_CONFIG_PATH: &str = "CURATOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/curator.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_items_per_run: usize,
    pub daily_limit: u32,
    pub min_relevance: f64,
    /// Ceiling applied on top of each source's own `max_items`.
    pub max_items_per_source: u32,
    pub interval_minutes: u64,
    pub scheduler_enabled: bool,
    pub feed_freshness_days: i64,
    pub max_keywords: usize,
    pub run_history: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_items_per_run: 15,
            daily_limit: 30,
            min_relevance: 0.5,
            max_items_per_source: 3,
            interval_minutes: 60,
            scheduler_enabled: true,
            feed_freshness_days: 7,
            max_keywords: 10,
            run_history: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file. Empty means the in-memory store.
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "data/curator.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub pipeline: PipelineSettings,
    pub validation: ValidationRules,
    pub scoring: ScoringConfig,
    pub selection: SelectionPolicy,
    pub platform: PlatformConfig,
    pub fetch: FetcherConfig,
    pub store: StoreSettings,
    pub sources: Vec<SourceSeed>,
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

impl CuratorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: CuratorConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading curator config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing curator config at {}", path.display()))
    }

    /// Resolve config in order:
    /// 1) $CURATOR_CONFIG_PATH (must exist)
    /// 2) config/curator.toml
    /// 3) built-in defaults
    ///
    /// Env overrides are applied last. Returns the file used, if any.
    pub fn load_default() -> Result<(Self, Option<PathBuf>)> {
        let (mut cfg, path) = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            (Self::load_from(&pb)?, Some(pb))
        } else {
            let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
            if pb.exists() {
                (Self::load_from(&pb)?, Some(pb))
            } else {
                (Self::default(), None)
            }
        };
        cfg.apply_overrides_from(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok((cfg, path))
    }

    /// Apply `CURATOR_*` / `PLATFORM_*` overrides from any key lookup.
    pub fn apply_overrides_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_env("CURATOR_DAILY_LIMIT", get("CURATOR_DAILY_LIMIT")) {
            self.pipeline.daily_limit = v;
        }
        if let Some(v) = parse_env("CURATOR_MAX_ITEMS_PER_RUN", get("CURATOR_MAX_ITEMS_PER_RUN")) {
            self.pipeline.max_items_per_run = v;
        }
        if let Some(v) = parse_env("CURATOR_MIN_RELEVANCE", get("CURATOR_MIN_RELEVANCE")) {
            self.pipeline.min_relevance = v;
        }
        if let Some(v) = get("CURATOR_DB_PATH") {
            self.store.db_path = v;
        }
        if let Some(v) = get("PLATFORM_API_KEY") {
            self.platform.api_key = v;
        }
        if let Some(v) = get("PLATFORM_BASE_URL") {
            self.platform.base_url = v;
        }
        if let Some(v) = get("PLATFORM_WORKFLOW_ID") {
            self.platform.workflow_id = v;
        }
    }

    /// Clamp values into ranges the pipeline can work with.
    pub fn sanitize(&mut self) {
        let p = &mut self.pipeline;
        if !p.min_relevance.is_finite() {
            p.min_relevance = PipelineSettings::default().min_relevance;
        }
        p.min_relevance = p.min_relevance.clamp(0.0, 1.0);
        p.max_items_per_run = p.max_items_per_run.max(1);
        p.max_items_per_source = p.max_items_per_source.max(1);
        p.interval_minutes = p.interval_minutes.max(1);
        p.feed_freshness_days = p.feed_freshness_days.max(1);
        p.max_keywords = p.max_keywords.max(1);
        p.run_history = p.run_history.clamp(1, 10_000);

        let s = &mut self.selection;
        for x in [&mut s.tier_a_min, &mut s.tier_b_min, &mut s.tier_c_min] {
            *x = if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.5 };
        }
        s.tier_b_min = s.tier_b_min.min(s.tier_a_min);
        s.tier_c_min = s.tier_c_min.min(s.tier_b_min);

        self.scoring.sanitize();
        self.sources.retain(|src| !src.url.trim().is_empty());
    }
}
