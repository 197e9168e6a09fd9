//! Generation sessions and the orchestrator that drives them.
//!
//! The orchestrator owns the session, runs stages in order, executes the
//! assembled script, and decides between refining and stopping. Everything
//! a session produces lands in its own [`SessionWorkspace`].
mod cancel;
mod orchestrator;
mod revise;
mod session;
mod state;
mod workspace;

pub use cancel::{install_interrupt_handler, CancelToken};
pub use orchestrator::Orchestrator;
pub use session::GenerationSession;
pub use state::SessionState;
pub use workspace::{default_workspace_root, SessionMetadata, SessionWorkspace, StageOutcome};

#[cfg(test)]
pub use workspace::IterationRating;
