//! One end-to-end generation attempt across iterations.
use super::state::SessionState;
use crate::error::ContractViolation;
use crate::render::RenderOutcome;
use crate::scene::{ReviewOutcome, SceneContext};
use crate::stages::{StageArtifact, StageId};
use serde::{Deserialize, Serialize};

/// Everything one pass through the pipeline produced.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    /// 1-based.
    pub iteration: u32,
    /// Context the later stages of this iteration saw.
    pub context: SceneContext,
    pub artifacts: Vec<StageArtifact>,
    pub render: Option<RenderOutcome>,
    pub review: Option<ReviewOutcome>,
}

impl IterationRecord {
    pub fn rating(&self) -> Option<u8> {
        self.review.as_ref().map(|review| review.rating)
    }

    pub fn artifact(&self, stage: StageId) -> Option<&StageArtifact> {
        self.artifacts.iter().find(|artifact| artifact.stage == stage)
    }
}

/// Pointer to a persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub stage: StageId,
    pub iteration: u32,
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    /// State the session was in (or entering) when it failed.
    pub state: SessionState,
    pub iteration: u32,
    pub cause: String,
    pub last_artifact: Option<ArtifactRef>,
}

/// Aggregate owned and mutated only by the orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub id: String,
    pub prompt: String,
    state: SessionState,
    iterations: Vec<IterationRecord>,
    failure: Option<SessionFailure>,
    caveat: Option<String>,
    pub started_at_epoch_ms: u128,
    finished_at_epoch_ms: Option<u128>,
}

impl GenerationSession {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, started_at_epoch_ms: u128) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            state: SessionState::Pending,
            iterations: Vec::new(),
            failure: None,
            caveat: None,
            started_at_epoch_ms,
            finished_at_epoch_ms: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn iteration_count(&self) -> u32 {
        self.iterations.len() as u32
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    pub fn caveat(&self) -> Option<&str> {
        self.caveat.as_deref()
    }

    pub fn finished_at_epoch_ms(&self) -> Option<u128> {
        self.finished_at_epoch_ms
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), ContractViolation> {
        self.state.check_transition(next)?;
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
        Ok(())
    }

    /// Open the next iteration and return its number.
    pub fn begin_iteration(&mut self, context: SceneContext) -> u32 {
        let iteration = self.iteration_count() + 1;
        self.iterations.push(IterationRecord {
            iteration,
            context,
            artifacts: Vec::new(),
            render: None,
            review: None,
        });
        iteration
    }

    fn current_mut(&mut self) -> Result<&mut IterationRecord, ContractViolation> {
        self.iterations
            .last_mut()
            .ok_or_else(|| ContractViolation::IllegalTransition {
                from: SessionState::Pending.to_string(),
                to: "artifact without an open iteration".to_string(),
            })
    }

    pub fn current(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }

    pub fn push_artifact(&mut self, artifact: StageArtifact) -> Result<(), ContractViolation> {
        self.current_mut()?.artifacts.push(artifact);
        Ok(())
    }

    pub fn set_context(&mut self, context: SceneContext) -> Result<(), ContractViolation> {
        self.current_mut()?.context = context;
        Ok(())
    }

    pub fn set_render(&mut self, render: RenderOutcome) -> Result<(), ContractViolation> {
        self.current_mut()?.render = Some(render);
        Ok(())
    }

    pub fn set_review(&mut self, review: ReviewOutcome) -> Result<(), ContractViolation> {
        self.current_mut()?.review = Some(review);
        Ok(())
    }

    /// Most recent artifact across all iterations.
    pub fn last_artifact(&self) -> Option<ArtifactRef> {
        self.iterations.iter().rev().find_map(|record| {
            record.artifacts.last().map(|artifact| ArtifactRef {
                stage: artifact.stage,
                iteration: artifact.iteration,
            })
        })
    }

    /// Highest-rated iteration, earliest on ties. Without any review, the
    /// latest iteration that executed.
    pub fn best_iteration(&self) -> Option<&IterationRecord> {
        let mut best: Option<&IterationRecord> = None;
        for record in &self.iterations {
            let Some(rating) = record.rating() else {
                continue;
            };
            if best.and_then(IterationRecord::rating).map_or(true, |top| rating > top) {
                best = Some(record);
            }
        }
        best.or_else(|| {
            self.iterations
                .iter()
                .rev()
                .find(|record| record.render.is_some())
        })
    }

    pub fn ratings(&self) -> Vec<(u32, u8)> {
        self.iterations
            .iter()
            .filter_map(|record| record.rating().map(|rating| (record.iteration, rating)))
            .collect()
    }

    /// Move to `Complete`, optionally annotated.
    pub fn complete(&mut self, caveat: Option<String>, finished_at_epoch_ms: u128) -> Result<(), ContractViolation> {
        self.transition(SessionState::Complete)?;
        self.caveat = caveat;
        self.finished_at_epoch_ms = Some(finished_at_epoch_ms);
        Ok(())
    }

    /// Move to `Failed` from whatever live state the session is in.
    pub fn fail(&mut self, state: SessionState, cause: String, finished_at_epoch_ms: u128) {
        if self.state.is_terminal() {
            return;
        }
        self.failure = Some(SessionFailure {
            state,
            iteration: self.iteration_count(),
            cause,
            last_artifact: self.last_artifact(),
        });
        self.state = SessionState::Failed;
        self.finished_at_epoch_ms = Some(finished_at_epoch_ms);
    }
}
