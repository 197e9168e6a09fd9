//! Stage executors.
//!
//! Every pipeline step sits behind [`StageExecutor`]: take the scene context
//! plus what earlier stages produced, return one immutable [`StageArtifact`].
//! Concept, script, and review stages talk to a [`TextGenerator`]; the
//! lighting stage is computed locally from the asset catalog.
//!
//! [`TextGenerator`]: crate::lm::TextGenerator
mod concept;
mod lighting;
mod prompt;
mod review;
mod script;

pub use concept::ConceptStage;
pub use lighting::LightingStage;
pub use review::ReviewStage;
pub use script::ScriptStage;

use crate::catalog::AssetCatalog;
use crate::config::WorkflowConfig;
use crate::error::{ContractViolation, StageError};
use crate::lm::TextGenerator;
use crate::render::RenderOutcome;
use crate::scene::{ConceptDocument, ReviewOutcome, SceneContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Pipeline steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Concept,
    Geometry,
    Materials,
    Lighting,
    RenderSetup,
    Review,
}

impl StageId {
    /// Stages that run before execution, in order.
    pub const PIPELINE: [StageId; 5] = [
        StageId::Concept,
        StageId::Geometry,
        StageId::Materials,
        StageId::Lighting,
        StageId::RenderSetup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Concept => "concept",
            StageId::Geometry => "geometry",
            StageId::Materials => "materials",
            StageId::Lighting => "lighting",
            StageId::RenderSetup => "render_setup",
            StageId::Review => "review",
        }
    }

    /// Position in the pipeline; the assembler sorts by this.
    pub fn order(&self) -> u8 {
        *self as u8
    }

    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            StageId::Concept => ArtifactKind::Concept,
            StageId::Review => ArtifactKind::Review,
            _ => ArtifactKind::Script,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "concept" => Ok(StageId::Concept),
            "geometry" => Ok(StageId::Geometry),
            "materials" => Ok(StageId::Materials),
            "lighting" => Ok(StageId::Lighting),
            "render_setup" | "camera" => Ok(StageId::RenderSetup),
            "review" => Ok(StageId::Review),
            _ => Err(format!("unknown stage {value:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Concept JSON (a `ConceptDocument`).
    Concept,
    /// Executable render-host script fragment.
    Script,
    /// Review JSON (a `ReviewOutcome`).
    Review,
}

/// Output of one stage in one iteration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    pub stage: StageId,
    pub iteration: u32,
    pub kind: ArtifactKind,
    pub content: String,
    pub created_at_epoch_ms: u128,
}

impl StageArtifact {
    pub fn new(stage: StageId, iteration: u32, content: String, created_at_epoch_ms: u128) -> Self {
        Self {
            stage,
            iteration,
            kind: stage.artifact_kind(),
            content,
            created_at_epoch_ms,
        }
    }

    /// Well-formedness required before the session may move past this stage.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        match self.kind {
            ArtifactKind::Script if self.content.trim().is_empty() => Err(self.malformed("script is empty")),
            ArtifactKind::Script => Ok(()),
            ArtifactKind::Concept => self.concept().map(|_| ()),
            ArtifactKind::Review => self.review().map(|_| ()),
        }
    }

    pub fn concept(&self) -> Result<ConceptDocument, ContractViolation> {
        if self.kind != ArtifactKind::Concept {
            return Err(self.malformed("not a concept artifact"));
        }
        serde_json::from_str(&self.content).map_err(|err| self.malformed(&err.to_string()))
    }

    pub fn review(&self) -> Result<ReviewOutcome, ContractViolation> {
        if self.kind != ArtifactKind::Review {
            return Err(self.malformed("not a review artifact"));
        }
        serde_json::from_str(&self.content).map_err(|err| self.malformed(&err.to_string()))
    }

    fn malformed(&self, reason: &str) -> ContractViolation {
        ContractViolation::MalformedArtifact {
            stage: self.stage,
            reason: reason.to_string(),
        }
    }
}

/// Everything a stage may read.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub context: &'a SceneContext,
    pub iteration: u32,
    /// Artifacts from earlier stages of this iteration, in execution order.
    pub prior: &'a [StageArtifact],
    /// Review of the previous iteration, when refining.
    pub previous_review: Option<&'a ReviewOutcome>,
    /// Present only for the review stage.
    pub render: Option<&'a RenderOutcome>,
    /// Stamped on the artifact produced from this input.
    pub started_at_epoch_ms: u128,
}

impl StageInput<'_> {
    pub fn suggestions_for(&self, stage: StageId) -> &[String] {
        self.previous_review
            .map(|review| review.suggestions_for(stage))
            .unwrap_or_default()
    }

    pub fn ran_stages(&self) -> Vec<StageId> {
        self.prior.iter().map(|artifact| artifact.stage).collect()
    }
}

/// One pipeline step.
pub trait StageExecutor: Send + Sync {
    fn stage(&self) -> StageId;

    fn produce(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError>;
}

/// Registered executors keyed by stage.
#[derive(Clone, Default)]
pub struct StageSet {
    executors: BTreeMap<StageId, Arc<dyn StageExecutor>>,
}

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor`, replacing any executor for the same stage.
    pub fn register(&mut self, executor: Arc<dyn StageExecutor>) -> &mut Self {
        self.executors.insert(executor.stage(), executor);
        self
    }

    pub fn get(&self, stage: StageId) -> Option<&Arc<dyn StageExecutor>> {
        self.executors.get(&stage)
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.executors.contains_key(&stage)
    }

    /// The standard pipeline: every stage, backed by `generator` and `catalog`.
    pub fn standard(
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<dyn AssetCatalog>,
        config: &WorkflowConfig,
    ) -> Self {
        let backoff = config.retry_backoff();
        let mut set = Self::new();
        set.register(Arc::new(ConceptStage::new(generator.clone(), backoff)))
            .register(Arc::new(ScriptStage::geometry(generator.clone(), backoff)))
            .register(Arc::new(ScriptStage::materials(generator.clone(), backoff)))
            .register(Arc::new(LightingStage::new(catalog, config.lighting.clone())))
            .register(Arc::new(ScriptStage::render_setup(generator.clone(), backoff)))
            .register(Arc::new(ReviewStage::new(generator, backoff)));
        set
    }
}
