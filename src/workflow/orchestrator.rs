//! The session state machine driver.
//!
//! One call to [`Orchestrator::run`] takes a prompt through concept,
//! geometry, materials, lighting and render setup, executes the assembled
//! script, reviews the render and either stops or refines. Stages run
//! strictly in sequence; every transition is a cancellation point.
use super::cancel::CancelToken;
use super::revise::{ContextReviser, SuggestionFold};
use super::session::GenerationSession;
use super::state::SessionState;
use super::workspace::{SessionMetadata, SessionWorkspace, StageLogBuilder, StageLogEntry};
use crate::assemble::{RenderFooter, ScriptAssembler};
use crate::config::WorkflowConfig;
use crate::error::{ExecutionError, StageError};
use crate::render::{RenderConnector, RenderJob, RenderOutcome};
use crate::scene::{ReviewOutcome, SceneContext};
use crate::stages::{StageArtifact, StageId, StageInput, StageSet};
use crate::util::now_epoch_ms;
use anyhow::Result;
use std::sync::Arc;

/// Why a drive loop stopped short of `Complete`.
struct Halt {
    state: SessionState,
    cause: String,
}

impl Halt {
    fn new(state: SessionState, cause: impl Into<String>) -> Self {
        Self {
            state,
            cause: cause.into(),
        }
    }

    /// Workspace IO failures end the session like any stage failure.
    fn io(state: SessionState, err: anyhow::Error) -> Self {
        Self::new(state, format!("workspace: {err:#}"))
    }
}

pub struct Orchestrator {
    stages: StageSet,
    renderer: Arc<dyn RenderConnector>,
    config: WorkflowConfig,
    reviser: Arc<dyn ContextReviser>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(stages: StageSet, renderer: Arc<dyn RenderConnector>, config: WorkflowConfig) -> Self {
        Self {
            stages,
            renderer,
            config,
            reviser: Arc::new(SuggestionFold),
            cancel: CancelToken::new(),
        }
    }

    #[cfg(test)]
    pub fn with_reviser(mut self, reviser: Arc<dyn ContextReviser>) -> Self {
        self.reviser = reviser;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A pre-execution stage runs when it is both enabled and registered.
    fn participates(&self, stage: StageId) -> bool {
        let enabled = match stage {
            StageId::Review => self.config.review_enabled,
            _ => self.config.stages.is_enabled(stage),
        };
        enabled && self.stages.contains(stage)
    }

    /// Run one session to a terminal state.
    ///
    /// Stage, render and cancellation failures produce a `Failed` session,
    /// not an `Err`; `Err` is reserved for failing to record the result.
    pub fn run(&self, prompt: &str, workspace: &SessionWorkspace) -> Result<GenerationSession> {
        let mut session = GenerationSession::new(workspace.id(), prompt.trim(), now_epoch_ms()?);
        tracing::info!(
            session = %session.id,
            max_iterations = self.config.max_iterations,
            threshold = self.config.quality_threshold,
            review = self.config.review_enabled,
            "session started"
        );
        workspace.write_metadata(&SessionMetadata::from_session(&session))?;

        if let Err(halt) = self.drive(&mut session, workspace) {
            tracing::warn!(
                session = %session.id,
                state = %halt.state,
                iteration = session.iteration_count(),
                cause = %halt.cause,
                "session failed"
            );
            session.fail(halt.state, halt.cause, now_epoch_ms()?);
        }

        workspace.write_metadata(&SessionMetadata::from_session(&session))?;
        let best = session.best_iteration();
        tracing::info!(
            session = %session.id,
            state = %session.state(),
            iterations = session.iteration_count(),
            best_iteration = best.map(|record| record.iteration),
            rating = best.and_then(|record| record.rating()),
            "session finished"
        );
        Ok(session)
    }

    fn drive(&self, session: &mut GenerationSession, workspace: &SessionWorkspace) -> Result<(), Halt> {
        let mut context = SceneContext::from_prompt(&session.prompt);
        let mut previous_review: Option<ReviewOutcome> = None;

        loop {
            let iteration = session.begin_iteration(context.clone());
            tracing::info!(session = %session.id, iteration, "iteration started");

            for stage in StageId::PIPELINE {
                if !self.participates(stage) {
                    tracing::debug!(iteration, stage = %stage, "stage skipped");
                    let entry = StageLogBuilder::new(iteration, stage.as_str()).skipped("disabled");
                    log_step(workspace, session.state(), entry)?;
                    continue;
                }
                self.enter(session, SessionState::for_stage(stage))?;
                let artifact = self.produce(session, workspace, stage, &context, previous_review.as_ref(), None)?;
                if stage == StageId::Concept {
                    let concept = artifact
                        .concept()
                        .map_err(|err| Halt::new(SessionState::Concept, err.to_string()))?;
                    context = SceneContext::from_concept(&context, &concept);
                    session
                        .set_context(context.clone())
                        .map_err(|err| Halt::new(SessionState::Concept, err.to_string()))?;
                }
            }

            self.enter(session, SessionState::Executing)?;
            let render = self.execute(session, workspace, iteration)?;

            if !self.participates(StageId::Review) {
                tracing::info!(iteration, "review disabled, accepting iteration");
                return finish(session, None);
            }

            self.enter(session, SessionState::Reviewing)?;
            let artifact = self.produce(
                session,
                workspace,
                StageId::Review,
                &context,
                previous_review.as_ref(),
                Some(&render),
            )?;
            let review = artifact
                .review()
                .map_err(|err| Halt::new(SessionState::Reviewing, err.to_string()))?;
            session
                .set_review(review.clone())
                .map_err(|err| Halt::new(SessionState::Reviewing, err.to_string()))?;

            let threshold = self.config.quality_threshold;
            if review.rating >= threshold {
                tracing::info!(iteration, rating = review.rating, threshold, "quality threshold met");
                return finish(session, None);
            }
            if iteration >= self.config.max_iterations {
                let caveat = exhaustion_caveat(session, threshold);
                tracing::info!(iteration, rating = review.rating, threshold, "refinement exhausted");
                return finish(session, Some(caveat));
            }

            tracing::info!(iteration, rating = review.rating, threshold, "refining");
            self.enter(session, SessionState::Refining)?;
            context = self.reviser.revise(&context, &review);
            previous_review = Some(review);
        }
    }

    /// Cancellation checkpoint, then the state change itself.
    fn enter(&self, session: &mut GenerationSession, next: SessionState) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            let err = StageError::Cancelled(format!("stopped before {next}"));
            return Err(Halt::new(next, err.to_string()));
        }
        session
            .transition(next)
            .map_err(|err| Halt::new(next, err.to_string()))
    }

    /// Run one stage, validate and persist its artifact, and append it to
    /// the current iteration.
    fn produce(
        &self,
        session: &mut GenerationSession,
        workspace: &SessionWorkspace,
        stage: StageId,
        context: &SceneContext,
        previous_review: Option<&ReviewOutcome>,
        render: Option<&RenderOutcome>,
    ) -> Result<StageArtifact, Halt> {
        let state = SessionState::for_stage(stage);
        let log = StageLogBuilder::new(session.iteration_count(), stage.as_str());
        let executor = self
            .stages
            .get(stage)
            .ok_or_else(|| Halt::new(state, format!("no executor registered for {stage}")))?;

        let started_at_epoch_ms = now_epoch_ms().map_err(|err| Halt::io(state, err))?;
        let produced = {
            let record = session
                .current()
                .ok_or_else(|| Halt::new(state, "no open iteration"))?;
            let input = StageInput {
                context,
                iteration: record.iteration,
                prior: &record.artifacts,
                previous_review,
                render,
                started_at_epoch_ms,
            };
            tracing::debug!(iteration = input.iteration, stage = %stage, "stage started");
            executor
                .produce(&input)
                .and_then(|artifact| artifact.validate().map(|()| artifact).map_err(StageError::from))
        };

        let artifact = match produced {
            Ok(artifact) => artifact,
            Err(err) => {
                log_step(workspace, state, log.failed(err.to_string()))?;
                return Err(Halt::new(state, format!("{stage} stage failed: {err}")));
            }
        };

        workspace
            .write_artifact(&artifact)
            .map_err(|err| Halt::io(state, err))?;
        let bytes = artifact.content.len();
        session
            .push_artifact(artifact.clone())
            .map_err(|err| Halt::new(state, err.to_string()))?;
        tracing::info!(iteration = artifact.iteration, stage = %stage, bytes, "stage complete");
        log_step(workspace, state, log.success(format!("{bytes} bytes")))?;
        Ok(artifact)
    }

    /// Assemble, persist and execute the iteration's script.
    fn execute(
        &self,
        session: &mut GenerationSession,
        workspace: &SessionWorkspace,
        iteration: u32,
    ) -> Result<RenderOutcome, Halt> {
        let state = SessionState::Executing;
        let log = StageLogBuilder::new(iteration, "execute");
        let output_path = workspace.render_output_path(iteration);
        let footer = RenderFooter {
            output_path: &output_path,
            mode: self.config.render_mode,
        };
        let artifacts = session
            .current()
            .map(|record| record.artifacts.as_slice())
            .unwrap_or_default();
        let script = ScriptAssembler.assemble(artifacts, Some(&footer));
        let script_path = workspace
            .write_combined_script(iteration, &script)
            .map_err(|err| Halt::io(state, err))?;

        let job = RenderJob {
            script: &script,
            script_path: &script_path,
            output_path: &output_path,
            timeout: self.config.render_timeout(),
            mode: self.config.render_mode,
        };
        match self.renderer.execute(&job) {
            Ok(outcome) => {
                workspace
                    .write_render_log(iteration, &outcome.log)
                    .map_err(|err| Halt::io(state, err))?;
                tracing::info!(
                    iteration,
                    exit_code = outcome.exit_code,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    artifact = outcome.artifact.is_some(),
                    "render complete"
                );
                log_step(workspace, state, log.success(render_summary(&outcome)))?;
                session
                    .set_render(outcome.clone())
                    .map_err(|err| Halt::new(state, err.to_string()))?;
                Ok(outcome)
            }
            Err(err) => {
                let excerpt = match &err {
                    ExecutionError::NonZeroExit { log_excerpt, .. }
                    | ExecutionError::TimedOut { log_excerpt, .. } => log_excerpt.as_str(),
                    ExecutionError::Spawn(message) => message.as_str(),
                };
                workspace
                    .write_render_log(iteration, excerpt)
                    .map_err(|io| Halt::io(state, io))?;
                log_step(workspace, state, log.failed(err.to_string()))?;
                Err(Halt::new(state, err.to_string()))
            }
        }
    }
}

fn finish(session: &mut GenerationSession, caveat: Option<String>) -> Result<(), Halt> {
    let state = session.state();
    let finished = now_epoch_ms().map_err(|err| Halt::io(state, err))?;
    session
        .complete(caveat, finished)
        .map_err(|err| Halt::new(state, err.to_string()))
}

fn exhaustion_caveat(session: &GenerationSession, threshold: u8) -> String {
    let best = session
        .best_iteration()
        .and_then(|record| record.rating().map(|rating| (record.iteration, rating)));
    match best {
        Some((iteration, rating)) => format!(
            "quality threshold {threshold} not reached after {} iterations; best was iteration {iteration} (rating {rating})",
            session.iteration_count()
        ),
        None => format!(
            "quality threshold {threshold} not reached after {} iterations",
            session.iteration_count()
        ),
    }
}

fn render_summary(outcome: &RenderOutcome) -> String {
    match &outcome.artifact {
        Some(path) => format!("rendered {}", path.display()),
        None => "script ran without writing an image".to_string(),
    }
}

fn log_step(workspace: &SessionWorkspace, state: SessionState, entry: Result<StageLogEntry>) -> Result<(), Halt> {
    entry
        .and_then(|entry| workspace.append_stage_log(&entry))
        .map_err(|err| Halt::io(state, err))
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
