use super::*;
use crate::catalog::StaticCatalog;
use std::collections::BTreeMap;

fn asset(name: &str, tags: &[&str]) -> LightingAsset {
    LightingAsset::new(name, tags.iter().copied(), format!("/hdri/{name}.hdr"), "2k")
}

fn context(mood: &[(&str, f64)], time: Option<&str>, environment: Option<&str>) -> SceneContext {
    SceneContext {
        prompt: "test".to_string(),
        mood: mood
            .iter()
            .map(|(label, weight)| (label.to_string(), *weight))
            .collect::<BTreeMap<_, _>>(),
        time_of_day: time.map(str::to_string),
        environment: environment.map(str::to_string),
        style: None,
        description: None,
    }
}

fn fixture_catalog() -> StaticCatalog {
    StaticCatalog::new(vec![
        asset("overcast_field", &["outdoor", "overcast", "nature"]),
        asset("sunset_loft", &["warm", "indoor", "sunset"]),
        asset("studio_neutral", &["studio", "indoor", "neutral", "soft"]),
        asset("night_street", &["night", "urban", "dark"]),
        asset("warm_cabin", &["warm", "indoor", "soft"]),
        asset("beach_noon", &["beach", "day", "bright", "clear"]),
    ])
    .unwrap()
}

#[test]
fn composite_score_follows_weighted_formula() {
    let ctx = context(&[("cozy", 1.0)], Some("sunset"), Some("indoor"));
    let loft = asset("sunset_loft", &["warm", "indoor", "sunset"]);
    // mood 2 tags * 2.0 + time (2 tags + 2.0 name bonus) * 1.5 + env 1 tag * 1.0
    assert_eq!(score_asset(&loft, &ctx), 11.0);
}

#[test]
fn name_bonus_applies_to_mood_and_environment() {
    let ctx = context(&[("cozy", 1.0)], None, Some("indoor"));
    let named = asset("cozy_indoor_set", &[]);
    assert_eq!(mood_score(&named, &ctx), NAME_MATCH_BONUS);
    assert_eq!(environment_score(&named, &ctx), NAME_MATCH_BONUS);
}

#[test]
fn mood_weights_scale_contributions() {
    let ctx = context(&[("cozy", 0.5), ("mysterious", 1.0)], None, None);
    let cabin = asset("cabin", &["warm", "dark"]);
    assert_eq!(mood_score(&cabin, &ctx), 0.5 * 1.0 + 1.0 * 1.0);
}

#[test]
fn unknown_labels_score_zero() {
    let ctx = context(&[("bewildered", 1.0)], Some("teatime"), Some("moon_base"));
    let odd = asset("bewildered_teatime_moon_base", &["bewildered", "teatime"]);
    assert_eq!(score_asset(&odd, &ctx), 0.0);
}

#[test]
fn selection_is_deterministic() {
    let catalog = fixture_catalog();
    let ctx = context(&[("cozy", 1.0), ("romantic", 0.4)], Some("evening"), Some("indoor"));
    let first = select_smart(&catalog, &ctx, 4);
    let second = select_smart(&catalog, &ctx, 4);
    assert_eq!(first, second);
}

#[test]
fn returns_exactly_the_top_k_by_score() {
    let catalog = fixture_catalog();
    let contexts = [
        context(&[("cozy", 1.0)], Some("sunset"), Some("indoor")),
        context(&[("eerie", 1.0)], Some("night"), Some("urban")),
        context(&[("cheerful", 0.7)], Some("noon"), Some("beach")),
        context(&[], None, None),
    ];
    for ctx in &contexts {
        for limit in 0..=catalog.len() {
            let selected = select_smart(&catalog, ctx, limit);
            assert_eq!(selected.len(), limit);

            let mut expected: Vec<(usize, f64)> = catalog
                .assets()
                .iter()
                .enumerate()
                .map(|(index, asset)| (index, score_asset(asset, ctx)))
                .collect();
            expected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            let expected_names: Vec<&str> = expected
                .iter()
                .take(limit)
                .map(|(index, _)| catalog.assets()[*index].name.as_str())
                .collect();
            let names: Vec<&str> = selected.iter().map(|s| s.asset.name.as_str()).collect();
            assert_eq!(names, expected_names);
        }
    }
}

#[test]
fn ties_keep_insertion_order() {
    let catalog = StaticCatalog::new(vec![
        asset("c", &["warm"]),
        asset("a", &["warm"]),
        asset("b", &["warm"]),
    ])
    .unwrap();
    let ctx = context(&[("cozy", 1.0)], None, None);
    let names: Vec<String> = select_smart(&catalog, &ctx, 3)
        .into_iter()
        .map(|scored| scored.asset.name)
        .collect();
    assert_eq!(names, ["c", "a", "b"]);
}

#[test]
fn zero_scores_still_rank_in_insertion_order() {
    let catalog = fixture_catalog();
    let ctx = context(&[], None, None);
    let selected = select_smart(&catalog, &ctx, 2);
    assert_eq!(selected[0].asset.name, "overcast_field");
    assert_eq!(selected[1].asset.name, "sunset_loft");
    assert!(selected.iter().all(|scored| scored.score == 0.0));
}

#[test]
fn empty_catalog_yields_empty_selection() {
    let catalog = StaticCatalog::empty();
    let ctx = context(&[("cozy", 1.0)], Some("sunset"), Some("indoor"));
    assert!(select_smart(&catalog, &ctx, 5).is_empty());
}

#[test]
fn limit_above_catalog_size_returns_everything() {
    let catalog = fixture_catalog();
    let ctx = context(&[("cozy", 1.0)], None, None);
    assert_eq!(select_smart(&catalog, &ctx, 50).len(), catalog.len());
}
