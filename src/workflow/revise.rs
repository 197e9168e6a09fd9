//! Folding a review back into the next iteration's context.
use crate::scene::{ReviewOutcome, SceneContext};
use std::fmt::Write as _;

const NOTES_HEADING: &str = "\n\nRefinement notes:\n";

/// Derives the next iteration's context from the last one and its review.
pub trait ContextReviser: Send + Sync {
    fn revise(&self, previous: &SceneContext, review: &ReviewOutcome) -> SceneContext;
}

/// Appends review feedback and per-stage suggestions to the request text.
///
/// Notes from earlier rounds are replaced, not accumulated, so the prompt
/// stays bounded across iterations.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuggestionFold;

impl ContextReviser for SuggestionFold {
    fn revise(&self, previous: &SceneContext, review: &ReviewOutcome) -> SceneContext {
        let base = match previous.prompt.find(NOTES_HEADING) {
            Some(index) => &previous.prompt[..index],
            None => previous.prompt.as_str(),
        };
        let mut prompt = base.trim_end().to_string();
        let feedback = review.feedback.trim();
        if feedback.is_empty() && review.suggestions.values().all(Vec::is_empty) {
            return previous.with_prompt(prompt);
        }
        prompt.push_str(NOTES_HEADING);
        if !feedback.is_empty() {
            let _ = writeln!(prompt, "- reviewer (rated {}/10): {feedback}", review.rating);
        }
        for (stage, notes) in &review.suggestions {
            for note in notes.iter().map(|note| note.trim()).filter(|note| !note.is_empty()) {
                let _ = writeln!(prompt, "- {stage}: {note}");
            }
        }
        previous.with_prompt(prompt.trim_end().to_string())
    }
}
