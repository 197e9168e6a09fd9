//! `sforge select`, `sforge blend`, and `sforge search`.
use crate::catalog::{AssetCatalog, LightingAsset, StaticCatalog};
use crate::cli::{BlendArgs, SceneQueryArgs, SearchArgs, SelectArgs};
use crate::lighting::{
    create_blend_configuration, default_lighting_script, generate_blend_script, select_smart, tint_for_time,
    BlendConfiguration,
};
use crate::scene::{normalize_label, SceneContext};
use anyhow::{anyhow, Context, Result};

/// Build a query context: prompt-derived labels, then explicit overrides.
fn query_context(query: &SceneQueryArgs) -> Result<SceneContext> {
    let mut context = SceneContext::from_prompt(query.prompt.as_deref().unwrap_or_default());
    if !query.mood.is_empty() {
        context.mood.clear();
        for entry in &query.mood {
            let (label, weight) = parse_mood(entry)?;
            context.mood.insert(label, weight);
        }
    }
    if let Some(time) = &query.time {
        context.time_of_day = Some(normalize_label(time));
    }
    if let Some(environment) = &query.environment {
        context.environment = Some(normalize_label(environment));
    }
    Ok(context)
}

/// `label` or `label=weight`, weight in `[0, 1]`.
fn parse_mood(entry: &str) -> Result<(String, f64)> {
    let (label, weight) = match entry.split_once('=') {
        Some((label, weight)) => {
            let weight: f64 = weight
                .trim()
                .parse()
                .with_context(|| format!("invalid mood weight in {entry:?}"))?;
            (label, weight)
        }
        None => (entry, 1.0),
    };
    if !(0.0..=1.0).contains(&weight) {
        return Err(anyhow!("mood weight must be between 0 and 1 (got {weight} in {entry:?})"));
    }
    let label = normalize_label(label);
    if label.is_empty() {
        return Err(anyhow!("empty mood label in {entry:?}"));
    }
    Ok((label, weight))
}

pub fn run_select(args: &SelectArgs) -> Result<()> {
    let catalog = StaticCatalog::load(&args.query.catalog)?;
    let context = query_context(&args.query)?;
    let ranked = select_smart(&catalog, &context, args.limit);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }
    if ranked.is_empty() {
        eprintln!("catalog is empty");
        return Ok(());
    }
    for (rank, scored) in ranked.iter().enumerate() {
        println!(
            "{:>2}. {:<32} {:>6.2}  [{}]",
            rank + 1,
            scored.asset.name,
            scored.score,
            scored.asset.tags.join(", ")
        );
    }
    Ok(())
}

pub fn run_blend(args: &BlendArgs) -> Result<()> {
    if !(args.world_strength.is_finite() && args.world_strength > 0.0) {
        return Err(anyhow!("--world-strength must be positive"));
    }
    let catalog = StaticCatalog::load(&args.query.catalog)?;
    let context = query_context(&args.query)?;
    let assets: Vec<LightingAsset> = select_smart(&catalog, &context, args.limit.min(args.max_layers))
        .into_iter()
        .filter(|scored| scored.score > 0.0)
        .map(|scored| scored.asset)
        .collect();
    let time_of_day = context.time_of_day.as_deref();

    let blend = if assets.is_empty() {
        BlendConfiguration::empty(args.mode)
    } else {
        create_blend_configuration(&assets, args.mode, args.max_layers)?.with_tint(tint_for_time(time_of_day))
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&blend)?);
    } else if blend.is_empty() {
        print!("{}", default_lighting_script(time_of_day, args.world_strength));
    } else {
        print!("{}", generate_blend_script(&blend, args.world_strength));
    }
    Ok(())
}

pub fn run_search(args: &SearchArgs) -> Result<()> {
    let catalog = StaticCatalog::load(&args.catalog)?;
    let found = catalog.search_by_tags(&args.tag, args.limit);
    for asset in &found {
        println!("{}\t{}\t{}", asset.name, asset.file.display(), asset.tags.join(","));
    }
    tracing::debug!(tags = ?args.tag, matches = found.len(), "catalog search");
    Ok(())
}
