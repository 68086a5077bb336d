// src/dedup.rs
//! Duplicate suppression: canonical URLs and body fingerprints.

use std::collections::HashSet;
use std::fmt::Write as _;

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::errors::{Rejection, StoreError};
use crate::store::ContentStore;

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "ref_src"];

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Canonical form used for uniqueness. `Url` already lowercases scheme and host
/// and drops default ports.
pub fn normalize_url(raw: &str) -> Result<String, Rejection> {
    let mut url = Url::parse(raw.trim()).map_err(|_| Rejection::InvalidUrl)?;
    if url.cannot_be_a_base() {
        return Err(Rejection::InvalidUrl);
    }
    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params.iter());
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Ok(url.to_string())
}

/// SHA-256 hex of the body with whitespace collapsed and case folded.
pub fn fingerprint(body: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    let normalized = re_ws.replace_all(body.trim(), " ").to_lowercase();

    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Store-backed duplicate checks plus a per-run seen set, so two copies found
/// in the same run are caught before either is inserted.
pub struct Deduplicator<'a> {
    store: &'a dyn ContentStore,
    seen_urls: HashSet<String>,
    seen_fingerprints: HashSet<String>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self {
            store,
            seen_urls: HashSet::new(),
            seen_fingerprints: HashSet::new(),
        }
    }

    /// Pre-fetch check on the canonical URL. Claims the URL for this run when new.
    pub async fn url_is_duplicate(&mut self, canonical_url: &str) -> Result<bool, StoreError> {
        if self.seen_urls.contains(canonical_url) || self.store.url_exists(canonical_url).await? {
            return Ok(true);
        }
        self.seen_urls.insert(canonical_url.to_string());
        Ok(false)
    }

    /// Post-fetch check on the body fingerprint. Claims it for this run when new.
    pub async fn fingerprint_is_duplicate(&mut self, fp: &str) -> Result<bool, StoreError> {
        if self.seen_fingerprints.contains(fp) || self.store.fingerprint_exists(fp).await? {
            return Ok(true);
        }
        self.seen_fingerprints.insert(fp.to_string());
        Ok(false)
    }

    /// Combined check for callers holding both keys.
    pub async fn is_duplicate(&mut self, canonical_url: &str, fp: &str) -> Result<bool, StoreError> {
        Ok(self.url_is_duplicate(canonical_url).await? || self.fingerprint_is_duplicate(fp).await?)
    }
}
