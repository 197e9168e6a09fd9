//! Weighted multi-criterion asset scoring.
use super::tags::{self, TagTable};
use crate::catalog::{AssetCatalog, LightingAsset};
use crate::scene::SceneContext;
use serde::Serialize;

pub const MOOD_WEIGHT: f64 = 2.0;
pub const TIME_WEIGHT: f64 = 1.5;
pub const ENVIRONMENT_WEIGHT: f64 = 1.0;

/// Bonus when the asset name contains the mood or environment label.
pub const NAME_MATCH_BONUS: f64 = 0.5;
/// Bonus when the asset name contains the time-of-day label.
pub const TIME_NAME_MATCH_BONUS: f64 = 2.0;

/// An asset and its composite score for one selection call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAsset {
    pub asset: LightingAsset,
    pub score: f64,
}

/// Rank every catalog asset against `context` and keep the best `limit`.
///
/// Ties keep catalog insertion order. An empty catalog yields an empty list.
pub fn select_smart(catalog: &dyn AssetCatalog, context: &SceneContext, limit: usize) -> Vec<ScoredAsset> {
    let mut scored: Vec<ScoredAsset> = catalog
        .assets()
        .iter()
        .map(|asset| ScoredAsset {
            asset: asset.clone(),
            score: score_asset(asset, context),
        })
        .collect();
    // Stable sort: equal scores stay in insertion order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

/// Composite score of one asset. Pure function of `(asset, context)`.
pub fn score_asset(asset: &LightingAsset, context: &SceneContext) -> f64 {
    mood_score(asset, context) * MOOD_WEIGHT
        + time_score(asset, context) * TIME_WEIGHT
        + environment_score(asset, context) * ENVIRONMENT_WEIGHT
}

/// Each mood label contributes its matches scaled by the label's weight.
pub fn mood_score(asset: &LightingAsset, context: &SceneContext) -> f64 {
    context
        .mood
        .iter()
        .map(|(label, weight)| {
            weight * criterion_score(asset, tags::MOOD_TAGS, label, NAME_MATCH_BONUS)
        })
        .sum()
}

pub fn time_score(asset: &LightingAsset, context: &SceneContext) -> f64 {
    context.time_of_day.as_deref().map_or(0.0, |label| {
        criterion_score(asset, tags::TIME_TAGS, label, TIME_NAME_MATCH_BONUS)
    })
}

pub fn environment_score(asset: &LightingAsset, context: &SceneContext) -> f64 {
    context.environment.as_deref().map_or(0.0, |label| {
        criterion_score(asset, tags::ENVIRONMENT_TAGS, label, NAME_MATCH_BONUS)
    })
}

/// +1 per asset tag in the label's expansion, plus `name_bonus` when the
/// asset name mentions the label. Unknown labels score zero.
fn criterion_score(asset: &LightingAsset, table: TagTable, label: &str, name_bonus: f64) -> f64 {
    let expansion = tags::expand(table, label);
    if expansion.is_empty() {
        return 0.0;
    }
    let tag_hits = asset
        .tags
        .iter()
        .filter(|tag| expansion.contains(&tag.as_str()))
        .count() as f64;
    let bonus = if asset.name.to_ascii_lowercase().contains(label) {
        name_bonus
    } else {
        0.0
    };
    tag_hits + bonus
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
