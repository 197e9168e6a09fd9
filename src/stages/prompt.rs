//! Prompt templates and the user-message sections shared by LM stages.
use super::{ArtifactKind, StageId, StageInput};
use crate::util::truncate_string;

pub(super) const CONCEPT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/concept.md"));
pub(super) const GEOMETRY_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/geometry.md"));
pub(super) const MATERIALS_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/materials.md"));
pub(super) const RENDER_SETUP_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/render_setup.md"));
pub(super) const REVIEW_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/review.md"));

/// Cap on each earlier script quoted back to the model.
const PRIOR_SCRIPT_BYTES: usize = 6000;

/// Scene section: request text, labels, and concept description.
pub(super) fn scene_section(input: &StageInput<'_>) -> String {
    let mut out = format!(
        "## Request\n\n{}\n\n## Scene\n\n{}",
        input.context.prompt.trim(),
        input.context.describe()
    );
    if let Some(description) = &input.context.description {
        out.push_str(&format!("\n## Concept\n\n{}\n", description.trim()));
    }
    out
}

/// Earlier script fragments of this iteration, fenced.
pub(super) fn prior_scripts_section(input: &StageInput<'_>) -> String {
    let scripts: Vec<_> = input
        .prior
        .iter()
        .filter(|artifact| artifact.kind == ArtifactKind::Script)
        .collect();
    if scripts.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Scripts so far\n");
    for artifact in scripts {
        out.push_str(&format!(
            "\n### {}\n\n```python\n{}\n```\n",
            artifact.stage,
            truncate_string(artifact.content.trim(), PRIOR_SCRIPT_BYTES)
        ));
    }
    out
}

/// Reviewer notes for `stage` from the previous iteration.
pub(super) fn suggestions_section(input: &StageInput<'_>, stage: StageId) -> String {
    let suggestions = input.suggestions_for(stage);
    let mut out = String::new();
    if let Some(review) = input.previous_review {
        out.push_str(&format!(
            "\n## Previous review\n\nRating: {}/10\n{}\n",
            review.rating,
            review.feedback.trim()
        ));
    }
    if !suggestions.is_empty() {
        out.push_str(&format!("\n## Requested changes for {stage}\n\n"));
        for suggestion in suggestions {
            out.push_str(&format!("- {suggestion}\n"));
        }
    }
    out
}
