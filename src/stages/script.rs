use super::prompt::{
    prior_scripts_section, scene_section, suggestions_section, GEOMETRY_TEMPLATE, MATERIALS_TEMPLATE,
    RENDER_SETUP_TEMPLATE,
};
use super::{StageArtifact, StageExecutor, StageId, StageInput};
use crate::error::{GenerationError, StageError};
use crate::lm::response::extract_code;
use crate::lm::{generate_validated, Message, TextGenerator};
use std::sync::Arc;
use std::time::Duration;

/// LM-written script fragment for geometry, materials, or render setup.
pub struct ScriptStage {
    stage: StageId,
    template: &'static str,
    generator: Arc<dyn TextGenerator>,
    backoff: Duration,
}

impl ScriptStage {
    pub fn geometry(generator: Arc<dyn TextGenerator>, backoff: Duration) -> Self {
        Self {
            stage: StageId::Geometry,
            template: GEOMETRY_TEMPLATE,
            generator,
            backoff,
        }
    }

    pub fn materials(generator: Arc<dyn TextGenerator>, backoff: Duration) -> Self {
        Self {
            stage: StageId::Materials,
            template: MATERIALS_TEMPLATE,
            generator,
            backoff,
        }
    }

    pub fn render_setup(generator: Arc<dyn TextGenerator>, backoff: Duration) -> Self {
        Self {
            stage: StageId::RenderSetup,
            template: RENDER_SETUP_TEMPLATE,
            generator,
            backoff,
        }
    }
}

impl StageExecutor for ScriptStage {
    fn stage(&self) -> StageId {
        self.stage
    }

    fn produce(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let message = format!(
            "{}{}{}",
            scene_section(input),
            prior_scripts_section(input),
            suggestions_section(input, self.stage)
        );
        let stage = self.stage;
        let generated = generate_validated(
            self.generator.as_ref(),
            self.template,
            &[Message::user(message)],
            self.backoff,
            |text| parse_script(stage, text),
        )?;
        tracing::debug!(
            stage = %self.stage,
            attempts = generated.attempts,
            elapsed_ms = generated.duration.as_millis() as u64,
            "stage response accepted"
        );
        Ok(StageArtifact::new(self.stage, input.iteration, generated.value, input.started_at_epoch_ms))
    }
}

fn parse_script(stage: StageId, text: &str) -> Result<String, StageError> {
    let code = extract_code(text);
    if code.is_empty() {
        return Err(GenerationError::Unparsable(format!("{stage} script is empty")).into());
    }
    Ok(format!("{code}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::testing::ScriptedGenerator;
    use crate::scene::{ReviewOutcome, SceneContext};
    use std::collections::BTreeMap;

    #[test]
    fn quotes_prior_scripts_and_review_notes() {
        let generator = Arc::new(ScriptedGenerator::new([Ok(
            "```python\nimport bpy\nmat = bpy.data.materials.new('wood')\n```".to_string(),
        )]));
        let stage = ScriptStage::materials(generator.clone(), Duration::ZERO);
        let context = SceneContext::from_prompt("a wooden cabin");
        let prior = [StageArtifact::new(
            StageId::Geometry,
            2,
            "import bpy\nbpy.ops.mesh.primitive_cube_add()\n".to_string(),
            1_000,
        )];
        let review = ReviewOutcome {
            rating: 4,
            feedback: "flat".to_string(),
            suggestions: BTreeMap::from([(StageId::Materials, vec!["use darker wood".to_string()])]),
        };
        let input = StageInput {
            context: &context,
            iteration: 2,
            prior: &prior,
            previous_review: Some(&review),
            render: None,
            started_at_epoch_ms: 1_000,
        };
        let artifact = stage.produce(&input).unwrap();
        assert_eq!(artifact.stage, StageId::Materials);
        assert_eq!(artifact.iteration, 2);
        assert!(artifact.content.starts_with("import bpy"));

        let message = &generator.calls()[0].1[0].content;
        assert!(message.contains("primitive_cube_add"));
        assert!(message.contains("use darker wood"));
    }

    #[test]
    fn blank_script_is_retried_then_surfaced() {
        let generator = Arc::new(ScriptedGenerator::new([
            Ok("```python\n\n```".to_string()),
            Ok("   ".to_string()),
        ]));
        let stage = ScriptStage::geometry(generator, Duration::ZERO);
        let context = SceneContext::from_prompt("anything");
        let input = StageInput {
            context: &context,
            iteration: 1,
            prior: &[],
            previous_review: None,
            render: None,
            started_at_epoch_ms: 1_000,
        };
        assert!(matches!(
            stage.produce(&input),
            Err(StageError::Generation(GenerationError::Unparsable(_)))
        ));
    }
}
