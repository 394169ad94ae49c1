use crate::config::DEFAULT_FONT_WEIGHT;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;

/// Weighted draw of one font name.
///
/// Candidates are the `available` fonts whose weight is positive; fonts
/// absent from `weights` count as [`DEFAULT_FONT_WEIGHT`]. With no
/// candidate the draw falls back to a uniform pick over `available`.
pub fn pick_weighted<R: Rng>(
    available: &[String],
    weights: &BTreeMap<String, u32>,
    rng: &mut R,
) -> Option<String> {
    let mut candidates = Vec::new();
    let mut candidate_weights = Vec::new();
    for font in available {
        let weight = weights.get(font).copied().unwrap_or(DEFAULT_FONT_WEIGHT);
        if weight > 0 {
            candidates.push(font);
            candidate_weights.push(weight);
        }
    }
    match WeightedIndex::new(&candidate_weights) {
        Ok(dist) => Some(candidates[dist.sample(rng)].clone()),
        Err(_) => available.choose(rng).cloned(),
    }
}

/// Fonts eligible for per-character mixing: available fonts with an
/// explicit positive weight, in catalog order. Falls back to the first
/// available font.
pub fn active_pool(available: &[String], weights: &BTreeMap<String, u32>) -> Vec<String> {
    let pool: Vec<String> = available
        .iter()
        .filter(|font| weights.get(*font).is_some_and(|w| *w > 0))
        .cloned()
        .collect();
    if pool.is_empty() {
        return available.first().cloned().into_iter().collect();
    }
    pool
}
