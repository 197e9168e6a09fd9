//! Workflow configuration.
//!
//! An optional `sforge.json` tunes the refinement loop, stage toggles,
//! lighting, and collaborator timeouts. Omitted fields take their defaults;
//! unknown fields are rejected so typos surface early.
use crate::lighting::BlendMode;
use crate::render::RenderMode;
use crate::scene::{MAX_RATING, MIN_RATING};
use crate::stages::StageId;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "sforge.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    pub schema_version: u32,
    pub max_iterations: u32,
    /// Minimum review rating (1-10) that ends refinement early.
    pub quality_threshold: u8,
    pub review_enabled: bool,
    pub stages: StageToggles,
    pub lighting: LightingConfig,
    pub lm_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub render_mode: RenderMode,
    /// Pause before the single stage-local retry.
    pub retry_backoff_ms: u64,
}

/// Which pre-execution stages participate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageToggles {
    pub concept: bool,
    pub geometry: bool,
    pub materials: bool,
    pub lighting: bool,
    pub render_setup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightingConfig {
    /// How many ranked assets the lighting stage asks for.
    pub asset_limit: usize,
    pub max_layers: usize,
    pub blend_mode: BlendMode,
    pub world_strength: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        default_config()
    }
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            concept: true,
            geometry: true,
            materials: true,
            lighting: true,
            render_setup: true,
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            asset_limit: 3,
            max_layers: 4,
            blend_mode: BlendMode::Layered,
            world_strength: 1.0,
        }
    }
}

impl StageToggles {
    pub fn is_enabled(&self, stage: StageId) -> bool {
        match stage {
            StageId::Concept => self.concept,
            StageId::Geometry => self.geometry,
            StageId::Materials => self.materials,
            StageId::Lighting => self.lighting,
            StageId::RenderSetup => self.render_setup,
            StageId::Review => true,
        }
    }

    pub fn set(&mut self, stage: StageId, enabled: bool) {
        match stage {
            StageId::Concept => self.concept = enabled,
            StageId::Geometry => self.geometry = enabled,
            StageId::Materials => self.materials = enabled,
            StageId::Lighting => self.lighting = enabled,
            StageId::RenderSetup => self.render_setup = enabled,
            StageId::Review => {}
        }
    }
}

impl WorkflowConfig {
    pub fn lm_timeout(&self) -> Duration {
        Duration::from_secs(self.lm_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Defaults used when no config file is present.
pub fn default_config() -> WorkflowConfig {
    WorkflowConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        max_iterations: 3,
        quality_threshold: 7,
        review_enabled: true,
        stages: StageToggles::default(),
        lighting: LightingConfig::default(),
        lm_timeout_secs: 180,
        render_timeout_secs: 600,
        render_mode: RenderMode::Preview,
        retry_backoff_ms: 1500,
    }
}

/// Render a pretty JSON config with every default spelled out.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

/// Load a config file. Validation is separate; see [`validate_config`].
pub fn load_config(path: &Path) -> Result<WorkflowConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: WorkflowConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}

/// Explicit path, else `./sforge.json` if present, else defaults; validated.
pub fn resolve_config(explicit: Option<&Path>) -> Result<WorkflowConfig> {
    let path: Option<PathBuf> = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            candidate.is_file().then_some(candidate)
        }
    };
    let config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading workflow config");
            load_config(&path)?
        }
        None => default_config(),
    };
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs the orchestrator cannot honour.
pub fn validate_config(config: &WorkflowConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.max_iterations == 0 {
        return Err(anyhow!("max_iterations must be at least 1"));
    }
    if !(MIN_RATING..=MAX_RATING).contains(&config.quality_threshold) {
        return Err(anyhow!(
            "quality_threshold must be between {MIN_RATING} and {MAX_RATING} (got {})",
            config.quality_threshold
        ));
    }
    if config.lm_timeout_secs == 0 || config.render_timeout_secs == 0 {
        return Err(anyhow!("lm_timeout_secs and render_timeout_secs must be positive"));
    }
    if config.lighting.asset_limit == 0 {
        return Err(anyhow!("lighting.asset_limit must be at least 1"));
    }
    if config.lighting.max_layers == 0 {
        return Err(anyhow!("lighting.max_layers must be at least 1"));
    }
    if !(config.lighting.world_strength.is_finite() && config.lighting.world_strength > 0.0) {
        return Err(anyhow!(
            "lighting.world_strength must be positive (got {})",
            config.lighting.world_strength
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
