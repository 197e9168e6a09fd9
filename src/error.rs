//! Error taxonomy for stage and session failures.
//!
//! Collaborator failures are typed so the orchestrator can tell a transient
//! text-generation hiccup (one local retry) from a fatal one (session fails).
//! Plumbing around the pipeline (config, catalog, workspace IO) stays on
//! `anyhow`.
use crate::stages::StageId;
use std::time::Duration;

/// Failures reported by a text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The backend may succeed if asked again (rate limit, dropped connection).
    #[error("text generation failed (transient): {0}")]
    Transient(String),
    /// Retrying will not help (bad config, rejected request, missing binary).
    #[error("text generation failed: {0}")]
    Fatal(String),
    #[error("text generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The backend answered but the answer could not be used.
    #[error("text generation returned an unusable response: {0}")]
    Unparsable(String),
}

impl GenerationError {
    /// Whether a single stage-local retry is permitted.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Unparsable(_))
    }
}

/// Failures executing the assembled script in the rendering host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to launch render host: {0}")]
    Spawn(String),
    #[error("render host exited with {status}: {log_excerpt}")]
    NonZeroExit { status: String, log_excerpt: String },
    #[error("render host timed out after {}s: {log_excerpt}", .timeout.as_secs())]
    TimedOut {
        timeout: Duration,
        log_excerpt: String,
    },
}

/// A programming-level invariant was broken. Never coerced, never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractViolation {
    #[error("blend strengths sum to {sum} (expected 1.0) in {mode} mode")]
    BlendStrengthSum { mode: &'static str, sum: f64 },
    #[error("blend layer {index} has negative strength {strength}")]
    NegativeStrength { index: usize, strength: f64 },
    #[error("blend configuration needs at least one asset")]
    EmptyBlend,
    #[error("blend configuration got {count} assets (max {max})")]
    TooManyLayers { count: usize, max: usize },
    #[error("review rating {0} is outside 1-10")]
    RatingOutOfRange(i64),
    #[error("illegal session transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },
    #[error("{stage} artifact is malformed: {reason}")]
    MalformedArtifact { stage: StageId, reason: String },
}

/// Anything that crosses a stage boundary unresolved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error("session cancelled: {0}")]
    Cancelled(String),
}
