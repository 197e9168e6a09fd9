//! Session lifecycle states and the legal transitions between them.
use crate::error::ContractViolation;
use crate::stages::StageId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Concept,
    Geometry,
    Materials,
    Lighting,
    RenderSetup,
    Executing,
    Reviewing,
    Refining,
    Complete,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Concept => "concept",
            SessionState::Geometry => "geometry",
            SessionState::Materials => "materials",
            SessionState::Lighting => "lighting",
            SessionState::RenderSetup => "render_setup",
            SessionState::Executing => "executing",
            SessionState::Reviewing => "reviewing",
            SessionState::Refining => "refining",
            SessionState::Complete => "complete",
            SessionState::Failed => "failed",
        }
    }

    pub fn for_stage(stage: StageId) -> Self {
        match stage {
            StageId::Concept => SessionState::Concept,
            StageId::Geometry => SessionState::Geometry,
            StageId::Materials => SessionState::Materials,
            StageId::Lighting => SessionState::Lighting,
            StageId::RenderSetup => SessionState::RenderSetup,
            StageId::Review => SessionState::Reviewing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed)
    }

    /// Position in the forward run from `Concept` to `Executing`.
    fn pipeline_rank(&self) -> Option<u8> {
        match self {
            SessionState::Concept => Some(1),
            SessionState::Geometry => Some(2),
            SessionState::Materials => Some(3),
            SessionState::Lighting => Some(4),
            SessionState::RenderSetup => Some(5),
            SessionState::Executing => Some(6),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal move.
    ///
    /// Disabled stages are skipped, so the forward run may jump ahead but
    /// never back. Any live state may fail; terminal states never move.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == SessionState::Failed {
            return true;
        }
        match (self, next) {
            (SessionState::Pending | SessionState::Refining, next) => next.pipeline_rank().is_some(),
            (SessionState::Executing, SessionState::Reviewing | SessionState::Complete) => true,
            (SessionState::Reviewing, SessionState::Refining | SessionState::Complete) => true,
            (current, next) => match (current.pipeline_rank(), next.pipeline_rank()) {
                (Some(from), Some(to)) => *current != SessionState::Executing && to > from,
                _ => false,
            },
        }
    }

    pub fn check_transition(&self, next: SessionState) -> Result<(), ContractViolation> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ContractViolation::IllegalTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
