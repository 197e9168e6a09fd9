use super::prompt::{scene_section, suggestions_section, CONCEPT_TEMPLATE};
use super::{StageArtifact, StageExecutor, StageId, StageInput};
use crate::error::{ContractViolation, GenerationError, StageError};
use crate::lm::response::extract_json;
use crate::lm::{generate_validated, Message, TextGenerator};
use crate::scene::ConceptDocument;
use std::sync::Arc;
use std::time::Duration;

/// Turns the request into a structured concept with scene labels.
pub struct ConceptStage {
    generator: Arc<dyn TextGenerator>,
    backoff: Duration,
}

impl ConceptStage {
    pub fn new(generator: Arc<dyn TextGenerator>, backoff: Duration) -> Self {
        Self { generator, backoff }
    }
}

impl StageExecutor for ConceptStage {
    fn stage(&self) -> StageId {
        StageId::Concept
    }

    fn produce(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let message = format!(
            "{}{}",
            scene_section(input),
            suggestions_section(input, StageId::Concept)
        );
        let generated = generate_validated(
            self.generator.as_ref(),
            CONCEPT_TEMPLATE,
            &[Message::user(message)],
            self.backoff,
            parse_concept,
        )?;
        tracing::debug!(
            stage = %StageId::Concept,
            attempts = generated.attempts,
            elapsed_ms = generated.duration.as_millis() as u64,
            "stage response accepted"
        );
        let content = serde_json::to_string_pretty(&generated.value).map_err(|err| {
            ContractViolation::MalformedArtifact {
                stage: StageId::Concept,
                reason: err.to_string(),
            }
        })?;
        Ok(StageArtifact::new(StageId::Concept, input.iteration, content, input.started_at_epoch_ms))
    }
}

fn parse_concept(text: &str) -> Result<ConceptDocument, StageError> {
    let document: ConceptDocument = serde_json::from_str(extract_json(text))
        .map_err(|err| GenerationError::Unparsable(format!("concept is not valid JSON: {err}")))?;
    if document.description.trim().is_empty() {
        return Err(GenerationError::Unparsable("concept description is empty".to_string()).into());
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::testing::ScriptedGenerator;
    use crate::scene::SceneContext;

    #[test]
    fn produces_concept_artifact() {
        let generator = Arc::new(ScriptedGenerator::new([Ok(r#"```json
{"description": "A reading nook", "mood": {"cozy": 0.9}, "time_of_day": "night"}
```"#
            .to_string())]));
        let stage = ConceptStage::new(generator.clone(), Duration::ZERO);
        let context = SceneContext::from_prompt("a cozy reading nook");
        let input = StageInput {
            context: &context,
            iteration: 1,
            prior: &[],
            previous_review: None,
            render: None,
            started_at_epoch_ms: 1_760_000_000_000,
        };
        let artifact = stage.produce(&input).unwrap();
        assert_eq!(artifact.created_at_epoch_ms, 1_760_000_000_000);
        let doc = artifact.concept().unwrap();
        assert_eq!(doc.description, "A reading nook");
        assert_eq!(doc.time_of_day.as_deref(), Some("night"));

        let calls = generator.calls();
        assert!(calls[0].0.starts_with("STAGE: concept"));
        assert!(calls[0].1[0].content.contains("a cozy reading nook"));
    }

    #[test]
    fn empty_description_is_unparsable() {
        assert!(matches!(
            parse_concept(r#"{"description": "  "}"#),
            Err(StageError::Generation(GenerationError::Unparsable(_)))
        ));
    }
}
