//! World lighting from the asset catalog. No text generation involved.
use super::{StageArtifact, StageExecutor, StageId, StageInput};
use crate::catalog::{AssetCatalog, LightingAsset};
use crate::config::LightingConfig;
use crate::error::StageError;
use crate::lighting::{
    create_blend_configuration, default_lighting_script, generate_blend_script, select_smart,
    tint_for_time,
};
use std::sync::Arc;

const BRIGHTER_FACTOR: f64 = 1.25;
const DARKER_FACTOR: f64 = 0.8;

pub struct LightingStage {
    catalog: Arc<dyn AssetCatalog>,
    config: LightingConfig,
}

impl LightingStage {
    pub fn new(catalog: Arc<dyn AssetCatalog>, config: LightingConfig) -> Self {
        Self { catalog, config }
    }

    /// World strength after reviewer exposure notes ("brighter", "darker").
    fn world_strength(&self, suggestions: &[String]) -> f64 {
        let mut strength = self.config.world_strength;
        for suggestion in suggestions {
            let text = suggestion.to_ascii_lowercase();
            if text.contains("brighter") {
                strength *= BRIGHTER_FACTOR;
            } else if text.contains("darker") || text.contains("dimmer") {
                strength *= DARKER_FACTOR;
            }
        }
        strength
    }
}

impl StageExecutor for LightingStage {
    fn stage(&self) -> StageId {
        StageId::Lighting
    }

    fn produce(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let limit = self.config.asset_limit.min(self.config.max_layers);
        let ranked = select_smart(self.catalog.as_ref(), input.context, limit);
        let assets: Vec<LightingAsset> = ranked
            .iter()
            .filter(|scored| scored.score > 0.0)
            .map(|scored| scored.asset.clone())
            .collect();
        let world_strength = self.world_strength(input.suggestions_for(StageId::Lighting));
        let time_of_day = input.context.time_of_day.as_deref();

        tracing::debug!(
            candidates = ranked.len(),
            selected = assets.len(),
            world_strength,
            "lighting assets selected"
        );

        let script = if assets.is_empty() {
            default_lighting_script(time_of_day, world_strength)
        } else {
            let blend = create_blend_configuration(&assets, self.config.blend_mode, self.config.max_layers)?
                .with_tint(tint_for_time(time_of_day));
            generate_blend_script(&blend, world_strength)
        };
        Ok(StageArtifact::new(StageId::Lighting, input.iteration, script, input.started_at_epoch_ms))
    }
}
