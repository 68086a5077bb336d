// src/relevance.rs
//! Relevance scoring and categorization: config types, regex compilation,
//! weighted sub-scores, and a hot-reloadable handle.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::model::Category;
use crate::validate::substantial_paragraphs;

pub const ENV_HOT_RELOAD: &str = "CURATOR_HOT_RELOAD";

/// Score with its weighted components, all in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct Relevance {
    pub score: f64,
    pub keyword: f64,
    pub title: f64,
    pub body_quality: f64,
    pub freshness: f64,
    pub matched: Vec<String>,
}

/// Borrowed view of whatever is being scored.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub body: &'a str,
    pub keywords: &'a [String],
    pub published_at: Option<DateTime<Utc>>,
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub keyword: f64,
    pub title: f64,
    pub body: f64,
    pub freshness: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 0.40,
            title: 0.30,
            body: 0.20,
            freshness: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CategoryIndicators {
    pub industry_news: Vec<String>,
    pub thought_leadership: Vec<String>,
    pub case_study: Vec<String>,
}

impl Default for CategoryIndicators {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            industry_news: v(&["announce", "launch", "release", "new", "latest", "update"]),
            thought_leadership: v(&[
                "future",
                "trend",
                "prediction",
                "analysis",
                "insight",
                "perspective",
            ]),
            case_study: v(&[
                "success",
                "case study",
                "customer",
                "client",
                "implementation",
                "roi",
                "results",
            ]),
        }
    }
}

impl CategoryIndicators {
    fn for_category(&self, c: Category) -> &[String] {
        match c {
            Category::IndustryNews => &self.industry_news,
            Category::ThoughtLeadership => &self.thought_leadership,
            Category::CaseStudy => &self.case_study,
        }
    }
}

pub fn default_target_keywords() -> Vec<String> {
    [
        "automation",
        "ai",
        "artificial intelligence",
        "machine learning",
        "workflow",
        "process",
        "business",
        "efficiency",
        "productivity",
        "digital transformation",
        "rpa",
        "intelligent automation",
        "enterprise",
        "saas",
        "b2b",
        "technology",
        "innovation",
        "integration",
        "orchestration",
        "optimization",
        "streamline",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub target_keywords: Vec<String>,
    /// Matches needed for a full keyword sub-score.
    pub keyword_saturation: usize,
    pub body_length_ceiling: usize,
    pub paragraph_target: usize,
    pub min_paragraph_chars: usize,
    pub weights: ScoreWeights,
    pub categories: CategoryIndicators,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            target_keywords: default_target_keywords(),
            keyword_saturation: 5,
            body_length_ceiling: 3000,
            paragraph_target: 6,
            min_paragraph_chars: 50,
            weights: ScoreWeights::default(),
            categories: CategoryIndicators::default(),
        }
    }
}

impl ScoringConfig {
    /// Clamp out-of-range values so scoring stays bounded.
    pub fn sanitize(&mut self) {
        let w = &mut self.weights;
        for x in [&mut w.keyword, &mut w.title, &mut w.body, &mut w.freshness] {
            if !x.is_finite() || *x < 0.0 {
                *x = 0.0;
            }
        }
        let total = w.keyword + w.title + w.body + w.freshness;
        if total <= 0.0 {
            *w = ScoreWeights::default();
        } else if total > 1.0 {
            w.keyword /= total;
            w.title /= total;
            w.body /= total;
            w.freshness /= total;
        }
        self.keyword_saturation = self.keyword_saturation.max(1);
        self.body_length_ceiling = self.body_length_ceiling.max(1);
        self.paragraph_target = self.paragraph_target.max(1);
        self.target_keywords.retain(|k| !k.trim().is_empty());
    }
}

/// File shape accepted by hot reload: the scoring section of the main config.
#[derive(Debug, Default, Deserialize)]
struct ScoringFile {
    #[serde(default)]
    scoring: ScoringConfig,
}

/* ----------------------------
Compiled engine
---------------------------- */

#[derive(Debug)]
struct CompiledTerm {
    term: String,
    re: Regex,
}

fn compile_terms(terms: &[String]) -> anyhow::Result<Vec<CompiledTerm>> {
    terms
        .iter()
        .map(|t| {
            let term = t.trim().to_lowercase();
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&term)))
                .map_err(|e| anyhow::anyhow!("term `{}` regex error: {}", term, e))?;
            Ok(CompiledTerm { term, re })
        })
        .collect()
}

#[derive(Debug)]
pub struct RelevanceEngine {
    pub cfg: ScoringConfig,
    targets: Vec<CompiledTerm>,
    indicators: Vec<(Category, Vec<CompiledTerm>)>,
}

impl Default for RelevanceEngine {
    fn default() -> Self {
        // Built-in terms are plain words; escaping makes compilation infallible.
        Self::new(ScoringConfig::default()).unwrap_or_else(|_| Self {
            cfg: ScoringConfig::default(),
            targets: Vec::new(),
            indicators: Vec::new(),
        })
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Age buckets: under 1d, 7d, 30d, 90d. Missing dates score as stale.
pub fn freshness(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(p) = published_at else {
        return 0.2;
    };
    let hours = (now - p).num_hours().max(0);
    match hours {
        h if h < 24 => 1.0,
        h if h < 24 * 7 => 0.8,
        h if h < 24 * 30 => 0.6,
        h if h < 24 * 90 => 0.4,
        _ => 0.2,
    }
}

impl RelevanceEngine {
    pub fn new(mut cfg: ScoringConfig) -> anyhow::Result<Self> {
        cfg.sanitize();
        let targets = compile_terms(&cfg.target_keywords)?;
        let indicators = Category::ALL
            .into_iter()
            .map(|c| Ok((c, compile_terms(cfg.categories.for_category(c))?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            cfg,
            targets,
            indicators,
        })
    }

    /// Build from a TOML document carrying a `[scoring]` table.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let file: ScoringFile = toml::from_str(toml_str)?;
        Self::new(file.scoring)
    }

    fn saturation(&self) -> usize {
        self.cfg.keyword_saturation.min(self.targets.len())
    }

    fn keyword_fraction(&self, text: &str, matched: &mut Vec<String>) -> f64 {
        let sat = self.saturation();
        if sat == 0 {
            return 0.0;
        }
        let mut hits = 0usize;
        for t in &self.targets {
            if t.re.is_match(text) {
                hits += 1;
                if !matched.contains(&t.term) {
                    matched.push(t.term.clone());
                }
            }
        }
        (hits as f64 / sat as f64).min(1.0)
    }

    /// `0.7 * sqrt(length share) + 0.3 * paragraph share`.
    pub fn body_quality(&self, body: &str) -> f64 {
        let len = body.chars().count() as f64;
        let len_share = (len / self.cfg.body_length_ceiling as f64).min(1.0);
        let paras = substantial_paragraphs(body, self.cfg.min_paragraph_chars) as f64;
        let para_share = (paras / self.cfg.paragraph_target as f64).min(1.0);
        0.7 * len_share.sqrt() + 0.3 * para_share
    }

    /// Pure function of the input and `now`.
    pub fn score(&self, input: &ScoreInput<'_>, now: DateTime<Utc>) -> Relevance {
        let mut matched = Vec::new();

        let content = format!(
            "{}\n{}\n{}",
            input.body,
            input.summary,
            input.keywords.join(" ")
        );
        let keyword = self.keyword_fraction(&content, &mut matched);
        let title = self.keyword_fraction(input.title, &mut matched);
        let body_quality = self.body_quality(input.body);
        let fresh = freshness(input.published_at, now);

        let w = &self.cfg.weights;
        let raw = w.keyword * keyword + w.title * title + w.body * body_quality + w.freshness * fresh;

        let rel = Relevance {
            score: round3(raw.clamp(0.0, 1.0)),
            keyword: round3(keyword),
            title: round3(title),
            body_quality: round3(body_quality),
            freshness: fresh,
            matched,
        };
        debug!(
            target: "relevance",
            score = rel.score,
            keyword = rel.keyword,
            title = rel.title,
            body_quality = rel.body_quality,
            freshness = rel.freshness,
            matched = ?rel.matched,
            "scored"
        );
        rel
    }

    /// Category with the most distinct indicator hits in title + summary.
    /// Ties go to the earlier category in `Category::ALL`; no hits means news.
    pub fn categorize(&self, title: &str, summary: &str) -> Category {
        let text = format!("{title}\n{summary}");
        let mut best = (Category::IndustryNews, 0usize);
        for (cat, terms) in &self.indicators {
            let hits = terms.iter().filter(|t| t.re.is_match(&text)).count();
            if hits > best.1 {
                best = (*cat, hits);
            }
        }
        best.0
    }
}

/* ----------------------------
Thread-safe handle + hot reload
---------------------------- */

/// Shared engine that can be swapped at runtime.
/// Enable reloading with CURATOR_HOT_RELOAD=1 (dev builds or SHUTTLE_ENV local/dev only).
#[derive(Clone)]
pub struct RelevanceHandle {
    inner: Arc<RwLock<RelevanceEngine>>,
}

impl RelevanceHandle {
    pub fn new(engine: RelevanceEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn score(&self, input: &ScoreInput<'_>, now: DateTime<Utc>) -> Relevance {
        if let Ok(eng) = self.inner.read() {
            eng.score(input, now)
        } else {
            Relevance::default()
        }
    }

    pub fn categorize(&self, title: &str, summary: &str) -> Category {
        if let Ok(eng) = self.inner.read() {
            eng.categorize(title, summary)
        } else {
            Category::IndustryNews
        }
    }

    pub fn replace(&self, engine: RelevanceEngine) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = engine;
        }
    }
}

fn hot_reload_enabled() -> bool {
    let want = std::env::var(ENV_HOT_RELOAD)
        .ok()
        .map(|v| v == "1")
        .unwrap_or(false);
    if !want {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Poll `path` every 2s and swap in a rebuilt engine when its mtime moves.
pub fn start_hot_reload_thread(handle: RelevanceHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }
    info!(path = %path.display(), "scoring hot reload enabled");

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = match last_mtime {
                    None => {
                        last_mtime = Some(mtime);
                        false
                    }
                    Some(prev) => mtime > prev,
                };
                if changed {
                    match fs::read_to_string(&path)
                        .map_err(anyhow::Error::from)
                        .and_then(|s| RelevanceEngine::from_toml_str(&s))
                    {
                        Ok(engine) => {
                            handle.replace(engine);
                            info!(path = %path.display(), "scoring config reloaded");
                        }
                        Err(e) => warn!(error = %e, "scoring config reload failed; keeping previous"),
                    }
                    last_mtime = Some(mtime);
                }
            }
            thread::sleep(poll);
        }
    });
}
