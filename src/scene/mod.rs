//! Scene context and review types passed between pipeline stages.
mod context;
mod review;

pub use context::{normalize_label, ConceptDocument, SceneContext};
pub use review::{ReviewOutcome, MAX_RATING, MIN_RATING};
