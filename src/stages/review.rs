use super::prompt::{prior_scripts_section, scene_section, REVIEW_TEMPLATE};
use super::{StageArtifact, StageExecutor, StageId, StageInput};
use crate::error::{ContractViolation, StageError};
use crate::lm::{generate_validated, Message, TextGenerator};
use crate::scene::ReviewOutcome;
use crate::util::tail_excerpt;
use std::sync::Arc;
use std::time::Duration;

const RENDER_LOG_BYTES: usize = 3000;

/// Rates an executed iteration and suggests per-stage changes.
pub struct ReviewStage {
    generator: Arc<dyn TextGenerator>,
    backoff: Duration,
}

impl ReviewStage {
    pub fn new(generator: Arc<dyn TextGenerator>, backoff: Duration) -> Self {
        Self { generator, backoff }
    }
}

impl StageExecutor for ReviewStage {
    fn stage(&self) -> StageId {
        StageId::Review
    }

    fn produce(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let ran = input.ran_stages();
        let mut message = scene_section(input);
        message.push_str(prior_scripts_section(input).as_str());
        message.push_str("\n## Stages that ran\n\n");
        for stage in &ran {
            message.push_str(&format!("- {stage}\n"));
        }
        if let Some(render) = input.render {
            message.push_str("\n## Render result\n\n");
            match &render.artifact {
                Some(path) => message.push_str(&format!("Image written to {}\n", path.display())),
                None => message.push_str("No image was produced.\n"),
            }
            message.push_str(&format!(
                "Host ran for {:.1}s.\n\n```text\n{}\n```\n",
                render.elapsed.as_secs_f64(),
                tail_excerpt(&render.log, RENDER_LOG_BYTES)
            ));
        }

        let generated = generate_validated(
            self.generator.as_ref(),
            REVIEW_TEMPLATE,
            &[Message::user(message)],
            self.backoff,
            |text| ReviewOutcome::parse(text, &ran),
        )?;
        tracing::debug!(
            stage = %StageId::Review,
            attempts = generated.attempts,
            elapsed_ms = generated.duration.as_millis() as u64,
            "stage response accepted"
        );
        let content = serde_json::to_string_pretty(&generated.value).map_err(|err| {
            ContractViolation::MalformedArtifact {
                stage: StageId::Review,
                reason: err.to_string(),
            }
        })?;
        Ok(StageArtifact::new(StageId::Review, input.iteration, content, input.started_at_epoch_ms))
    }
}
