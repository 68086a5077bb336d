// tests/selection.rs
//
// Tier caps, diversity inside tier B, quota truncation and tier ordering.

mod common;

use std::collections::HashMap;

use common::new_item;
use content_curator::model::{Category, ContentItem};
use content_curator::select::{select, SelectionPolicy, Selector, Tier};

fn item(id: i64, score: f64, cat: Category, source: i64) -> ContentItem {
    ContentItem::from_new(
        id,
        new_item(&format!("https://example.com/{id}"), score, cat, source),
    )
}

fn pool_8a_10b_20c() -> Vec<ContentItem> {
    let mut pool = Vec::new();
    let mut id = 0;
    let mut next = || {
        id += 1;
        id
    };
    for i in 0..8 {
        pool.push(item(next(), 0.95 - i as f64 * 0.01, Category::IndustryNews, 1));
    }
    let cats = [
        Category::IndustryNews,
        Category::ThoughtLeadership,
        Category::CaseStudy,
    ];
    for i in 0..10 {
        pool.push(item(next(), 0.75 - i as f64 * 0.01, cats[i % 3], 10 + i as i64));
    }
    for i in 0..20 {
        pool.push(item(next(), 0.58 - i as f64 * 0.001, Category::CaseStudy, 2));
    }
    pool
}

fn tiers(sel: &[content_curator::select::Selected]) -> HashMap<Tier, usize> {
    let mut m = HashMap::new();
    for s in sel {
        *m.entry(s.tier).or_insert(0) += 1;
    }
    m
}

#[test]
fn tier_shares_fill_a_batch_of_fifteen() {
    let sel = select(pool_8a_10b_20c(), 15, 15);
    assert_eq!(sel.len(), 15);

    let t = tiers(&sel);
    assert_eq!(t[&Tier::A], 6);
    assert_eq!(t[&Tier::B], 7);
    assert_eq!(t[&Tier::C], 2);

    // tier B spreads over all three categories
    let mut per_cat: HashMap<Category, usize> = HashMap::new();
    for s in sel.iter().filter(|s| s.tier == Tier::B) {
        *per_cat.entry(s.item.category.unwrap()).or_insert(0) += 1;
    }
    assert_eq!(per_cat.len(), 3);
    assert!(per_cat.values().all(|&n| (2..=3).contains(&n)));

    // the six best A items, best first
    let a_scores: Vec<f64> = sel[..6]
        .iter()
        .map(|s| s.item.relevance_score.unwrap())
        .collect();
    assert_eq!(a_scores[0], 0.95);
    assert!(a_scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn quota_of_three_truncates_with_best_tier_first() {
    let mut pool = Vec::new();
    for i in 0..2 {
        pool.push(item(i, 0.9, Category::IndustryNews, 1));
    }
    for i in 2..6 {
        pool.push(item(i, 0.7, Category::CaseStudy, 1));
    }
    for i in 6..10 {
        pool.push(item(i, 0.55, Category::ThoughtLeadership, 1));
    }

    let sel = select(pool, 15, 3);
    assert_eq!(sel.len(), 3);
    assert_eq!(sel[0].tier, Tier::A);
    assert!(sel.windows(2).all(|w| w[0].tier <= w[1].tier));
}

#[test]
fn below_threshold_never_selected_even_with_room() {
    let pool = vec![
        item(1, 0.49, Category::IndustryNews, 1),
        item(2, 0.2, Category::CaseStudy, 1),
        item(3, 0.61, Category::CaseStudy, 1),
    ];
    let sel = select(pool, 15, 30);
    assert_eq!(sel.len(), 1);
    assert_eq!(sel[0].item.id, 3);
}

#[test]
fn short_tiers_are_backfilled_up_to_the_batch_size() {
    // only A items: the tier A cap alone would give 5 of 10
    let pool: Vec<_> = (0..12)
        .map(|i| item(i, 0.9 - i as f64 * 0.001, Category::IndustryNews, 1))
        .collect();
    let sel = select(pool, 10, 30);
    assert_eq!(sel.len(), 10);
    assert!(sel.iter().all(|s| s.tier == Tier::A));
}

#[test]
fn output_never_exceeds_quota_or_target() {
    for (target, quota) in [(15, 0), (0, 10), (5, 2), (3, 30)] {
        let sel = select(pool_8a_10b_20c(), target, quota);
        assert!(sel.len() <= target.min(quota as usize));
    }
}

#[test]
fn custom_policy_thresholds_apply() {
    let policy = SelectionPolicy {
        tier_a_min: 0.9,
        tier_b_min: 0.7,
        tier_c_min: 0.65,
        ..SelectionPolicy::default()
    };
    let pool = vec![
        item(1, 0.6, Category::IndustryNews, 1),
        item(2, 0.66, Category::IndustryNews, 1),
        item(3, 0.95, Category::IndustryNews, 1),
    ];
    let sel = Selector::new(policy).select(pool, 15, 15);
    let ids: Vec<i64> = sel.iter().map(|s| s.item.id).collect();
    assert_eq!(ids, vec![3, 2]);
    assert_eq!(sel[1].tier, Tier::C);
}

fn a_and_c_pool() -> Vec<ContentItem> {
    let mut pool = Vec::new();
    for i in 0..4 {
        pool.push(item(i + 1, 0.95 - i as f64 * 0.04, Category::IndustryNews, 1));
    }
    for i in 0..4 {
        pool.push(item(i + 5, 0.55 - i as f64 * 0.01, Category::CaseStudy, 2));
    }
    pool
}

#[test]
fn small_quota_still_goes_to_the_best_tier() {
    for quota in 1..=4u32 {
        let sel = select(a_and_c_pool(), 15, quota);
        assert_eq!(sel.len(), quota as usize);
        assert!(sel.iter().all(|s| s.tier == Tier::A), "quota {quota}: {:?}", tiers(&sel));
        let ids: Vec<i64> = sel.iter().map(|s| s.item.id).collect();
        assert_eq!(ids, (1..=quota as i64).collect::<Vec<_>>());
    }
}

#[test]
fn small_quota_prefers_tier_b_over_tier_c() {
    let pool = vec![
        item(1, 0.55, Category::CaseStudy, 1),
        item(2, 0.7, Category::IndustryNews, 2),
        item(3, 0.65, Category::ThoughtLeadership, 3),
    ];
    let sel = select(pool, 15, 2);
    assert_eq!(sel.len(), 2);
    assert!(sel.iter().all(|s| s.tier == Tier::B));
}
