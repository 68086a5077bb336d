// src/select.rs
//! Tiered diversity selection over the candidate pool.
//!
//! Items are bucketed by score into tiers A/B/C. Each tier gets a share of the
//! effective batch size; tier B is additionally spread across categories and
//! sources with a rotating cursor. Slots a tier cannot fill are backfilled from
//! the remaining eligible items in tier-then-score order.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Category, ContentItem, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Tier {
    A,
    B,
    C,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    pub tier_a_min: f64,
    pub tier_b_min: f64,
    pub tier_c_min: f64,
    pub tier_a_share: f64,
    pub tier_b_share: f64,
    /// Slots tier A may take regardless of its share, bounded by the batch.
    pub tier_a_min_slots: usize,
    pub tier_b_min_slots: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            tier_a_min: 0.8,
            tier_b_min: 0.6,
            tier_c_min: 0.5,
            tier_a_share: 0.4,
            tier_b_share: 0.5,
            tier_a_min_slots: 5,
            tier_b_min_slots: 7,
        }
    }
}

impl SelectionPolicy {
    pub fn tier_of(&self, score: f64) -> Option<Tier> {
        if score >= self.tier_a_min {
            Some(Tier::A)
        } else if score >= self.tier_b_min {
            Some(Tier::B)
        } else if score >= self.tier_c_min {
            Some(Tier::C)
        } else {
            None
        }
    }

    /// `max(floor(share * E), min_slots)`, never above `E`. Small batches
    /// would otherwise floor the higher tiers to zero and hand every slot to C.
    fn cap(share: f64, min_slots: usize, effective: usize) -> usize {
        // epsilon absorbs float error such as 0.4 * 10 = 4.000000000000001
        let raw = (share.clamp(0.0, 1.0) * effective as f64 + 1e-9).floor();
        (raw as usize).max(min_slots).min(effective)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selected {
    pub item: ContentItem,
    pub tier: Tier,
}

/// Score desc, then earlier publish date (dated before undated), then pool order.
fn rank_cmp(a: (usize, &ContentItem), b: (usize, &ContentItem)) -> Ordering {
    let sa = a.1.relevance_score.unwrap_or(0.0);
    let sb = b.1.relevance_score.unwrap_or(0.0);
    sb.total_cmp(&sa)
        .then_with(|| match (a.1.published_at, b.1.published_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.0.cmp(&b.0))
}

fn category_of(item: &ContentItem) -> Category {
    item.category.unwrap_or(Category::IndustryNews)
}

/// Pick up to `cap` positions from `ranked` (already in score order), rotating
/// over category buckets and honoring per-category and per-source shares.
/// Any slots left after the diversity pass are filled in plain score order.
fn diversify(ranked: &[&ContentItem], cap: usize) -> Vec<usize> {
    if cap == 0 || ranked.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<Category> = Vec::new();
    let mut buckets: HashMap<Category, VecDeque<usize>> = HashMap::new();
    let mut sources: Vec<SourceId> = Vec::new();
    for (pos, item) in ranked.iter().enumerate() {
        let cat = category_of(item);
        if !buckets.contains_key(&cat) {
            order.push(cat);
        }
        buckets.entry(cat).or_default().push_back(pos);
        if !sources.contains(&item.source_id) {
            sources.push(item.source_id);
        }
    }

    let cat_share = cap.div_ceil(order.len());
    let src_share = cap.div_ceil(sources.len());
    let mut per_cat: HashMap<Category, usize> = HashMap::new();
    let mut per_src: HashMap<SourceId, usize> = HashMap::new();
    let mut taken = vec![false; ranked.len()];
    let mut picked: Vec<usize> = Vec::with_capacity(cap);

    'rotation: loop {
        let mut progressed = false;
        for cat in &order {
            if picked.len() >= cap {
                break 'rotation;
            }
            if per_cat.get(cat).copied().unwrap_or(0) >= cat_share {
                continue;
            }
            let Some(bucket) = buckets.get_mut(cat) else {
                continue;
            };
            let hit = bucket
                .iter()
                .position(|&pos| per_src.get(&ranked[pos].source_id).copied().unwrap_or(0) < src_share);
            if let Some(i) = hit {
                if let Some(pos) = bucket.remove(i) {
                    *per_cat.entry(*cat).or_insert(0) += 1;
                    *per_src.entry(ranked[pos].source_id).or_insert(0) += 1;
                    taken[pos] = true;
                    picked.push(pos);
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    for (pos, done) in taken.iter().enumerate() {
        if picked.len() >= cap {
            break;
        }
        if !done {
            picked.push(pos);
        }
    }
    picked
}

#[derive(Debug, Clone, Default)]
pub struct Selector {
    policy: SelectionPolicy,
}

impl Selector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Choose at most `min(target, remaining_quota)` items. Output order is
    /// tier A, then B in diversity order, then C.
    pub fn select(
        &self,
        pool: Vec<ContentItem>,
        target: usize,
        remaining_quota: u32,
    ) -> Vec<Selected> {
        let effective = target.min(remaining_quota as usize);
        if effective == 0 || pool.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, &ContentItem, Tier)> = pool
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let tier = self.policy.tier_of(item.relevance_score?)?;
                Some((i, item, tier))
            })
            .collect();
        ranked.sort_by(|a, b| rank_cmp((a.0, a.1), (b.0, b.1)));

        let in_tier = |t: Tier| {
            ranked
                .iter()
                .filter(|r| r.2 == t)
                .map(|r| (r.0, r.1))
                .collect::<Vec<_>>()
        };
        let tier_a = in_tier(Tier::A);
        let tier_b = in_tier(Tier::B);
        let tier_c = in_tier(Tier::C);

        let p = &self.policy;
        let cap_a = SelectionPolicy::cap(p.tier_a_share, p.tier_a_min_slots, effective);
        let cap_b = SelectionPolicy::cap(p.tier_b_share, p.tier_b_min_slots, effective);

        // pool indices picked per tier, in output order
        let mut pick_a: Vec<usize> = tier_a.iter().take(cap_a).map(|r| r.0).collect();

        let b_items: Vec<&ContentItem> = tier_b.iter().map(|r| r.1).collect();
        let mut pick_b: Vec<usize> = diversify(&b_items, cap_b.min(effective - pick_a.len()))
            .into_iter()
            .map(|pos| tier_b[pos].0)
            .collect();

        let cap_c = effective - pick_a.len() - pick_b.len();
        let mut pick_c: Vec<usize> = tier_c.iter().take(cap_c).map(|r| r.0).collect();

        let mut total = pick_a.len() + pick_b.len() + pick_c.len();
        if total < effective {
            for (tier, list, picks) in [
                (Tier::A, &tier_a, &mut pick_a),
                (Tier::B, &tier_b, &mut pick_b),
                (Tier::C, &tier_c, &mut pick_c),
            ] {
                for (idx, _) in list.iter() {
                    if total >= effective {
                        break;
                    }
                    if !picks.contains(idx) {
                        picks.push(*idx);
                        total += 1;
                        debug!(target: "select", ?tier, pool_index = idx, "backfill");
                    }
                }
            }
        }

        debug!(
            target: "select",
            effective,
            eligible = ranked.len(),
            tier_a = pick_a.len(),
            tier_b = pick_b.len(),
            tier_c = pick_c.len(),
            "batch selected"
        );

        let order: Vec<(usize, Tier)> = pick_a
            .into_iter()
            .map(|i| (i, Tier::A))
            .chain(pick_b.into_iter().map(|i| (i, Tier::B)))
            .chain(pick_c.into_iter().map(|i| (i, Tier::C)))
            .collect();

        let mut slots: Vec<Option<ContentItem>> = pool.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|(i, tier)| slots[i].take().map(|item| Selected { item, tier }))
            .collect()
    }
}

/// Selection with the default policy.
pub fn select(pool: Vec<ContentItem>, target: usize, remaining_quota: u32) -> Vec<Selected> {
    Selector::default().select(pool, target, remaining_quota)
}
