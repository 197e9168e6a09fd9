//! Blend configuration synthesis.
//!
//! Turns a ranked asset list into ordered layers with strength, rotation, and
//! optional tint. Pure: `layered` and `dominant` are fully deterministic,
//! `balanced` is deterministic given the asset set.
use crate::catalog::LightingAsset;
use crate::error::ContractViolation;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::path::PathBuf;

/// Allowed drift of the strength sum for normalized modes.
pub const STRENGTH_SUM_TOLERANCE: f64 = 1e-6;
/// Strength of layer 0 in `dominant` mode.
pub const DOMINANT_PRIMARY_STRENGTH: f64 = 0.7;

/// RGB multiplier in `[0, 1]^3`.
pub type Tint = [f64; 3];

/// How layer strengths are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Layer `i` gets `1/(i+1)`; not normalized.
    #[default]
    Layered,
    /// Equal strengths; seeded rotations.
    Balanced,
    /// Layer 0 gets 0.7, the rest split 0.3.
    Dominant,
}

impl BlendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Layered => "layered",
            BlendMode::Balanced => "balanced",
            BlendMode::Dominant => "dominant",
        }
    }

    fn is_normalized(&self) -> bool {
        !matches!(self, BlendMode::Layered)
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lighting contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendLayer {
    pub asset: String,
    pub file: PathBuf,
    /// In `[0, 1]`.
    pub strength: f64,
    /// Radians in `[0, 2π)`, about the vertical axis.
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint: Option<Tint>,
}

/// Ordered layers plus the mode that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendConfiguration {
    pub mode: BlendMode,
    pub layers: Vec<BlendLayer>,
}

impl BlendConfiguration {
    /// A configuration with no layers; renders as default (non-asset) lighting.
    pub fn empty(mode: BlendMode) -> Self {
        Self {
            mode,
            layers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn strength_sum(&self) -> f64 {
        self.layers.iter().map(|layer| layer.strength).sum()
    }

    /// Apply the same tint to every layer. Components are clamped into `[0, 1]`.
    pub fn with_tint(mut self, tint: Option<Tint>) -> Self {
        let tint = tint.map(|rgb| rgb.map(|c| c.clamp(0.0, 1.0)));
        for layer in &mut self.layers {
            layer.tint = tint;
        }
        self
    }

    /// Check the strength invariants for this configuration's mode.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.strength < 0.0 || !layer.strength.is_finite() {
                return Err(ContractViolation::NegativeStrength {
                    index,
                    strength: layer.strength,
                });
            }
        }
        if self.mode.is_normalized() && !self.layers.is_empty() {
            let sum = self.strength_sum();
            if (sum - 1.0).abs() > STRENGTH_SUM_TOLERANCE {
                return Err(ContractViolation::BlendStrengthSum {
                    mode: self.mode.as_str(),
                    sum,
                });
            }
        }
        Ok(())
    }
}

/// Build a blend configuration from at most `max_layers` ranked assets.
pub fn create_blend_configuration(
    assets: &[LightingAsset],
    mode: BlendMode,
    max_layers: usize,
) -> Result<BlendConfiguration, ContractViolation> {
    if assets.is_empty() {
        return Err(ContractViolation::EmptyBlend);
    }
    if assets.len() > max_layers {
        return Err(ContractViolation::TooManyLayers {
            count: assets.len(),
            max: max_layers,
        });
    }

    let count = assets.len();
    let strengths = strengths_for(mode, count);
    let rotations = match mode {
        BlendMode::Balanced => seeded_rotations(assets),
        BlendMode::Layered | BlendMode::Dominant => even_rotations(count),
    };

    let layers = assets
        .iter()
        .zip(strengths)
        .zip(rotations)
        .map(|((asset, strength), rotation)| BlendLayer {
            asset: asset.name.clone(),
            file: asset.file.clone(),
            strength,
            rotation,
            tint: None,
        })
        .collect();
    let configuration = BlendConfiguration { mode, layers };
    configuration.validate()?;
    Ok(configuration)
}

fn strengths_for(mode: BlendMode, count: usize) -> Vec<f64> {
    match mode {
        BlendMode::Layered => (0..count).map(|i| 1.0 / (i as f64 + 1.0)).collect(),
        BlendMode::Balanced => vec![1.0 / count as f64; count],
        BlendMode::Dominant => {
            if count == 1 {
                // Nobody to share the remainder with.
                return vec![1.0];
            }
            let rest = (1.0 - DOMINANT_PRIMARY_STRENGTH) / (count - 1) as f64;
            let mut strengths = vec![rest; count];
            strengths[0] = DOMINANT_PRIMARY_STRENGTH;
            strengths
        }
    }
}

fn even_rotations(count: usize) -> Vec<f64> {
    let step = TAU / count as f64;
    (0..count).map(|i| i as f64 * step).collect()
}

fn seeded_rotations(assets: &[LightingAsset]) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(asset_set_seed(assets));
    assets.iter().map(|_| rng.gen_range(0.0..TAU)).collect()
}

/// FNV-1a over the sorted asset names, so the seed ignores input order.
pub fn asset_set_seed(assets: &[LightingAsset]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut names: Vec<&str> = assets.iter().map(|asset| asset.name.as_str()).collect();
    names.sort_unstable();
    let mut hash = OFFSET;
    for name in names {
        for byte in name.bytes().chain(std::iter::once(0)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

#[cfg(test)]
#[path = "blend_tests.rs"]
mod tests;
