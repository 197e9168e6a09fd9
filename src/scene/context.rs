//! Per-attempt scene context derived from the request and the concept stage.
use crate::lighting::tags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Immutable view of what the scene should be, shared by every later stage.
///
/// A refinement iteration builds a fresh context instead of editing this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneContext {
    pub prompt: String,
    /// Mood label to weight in `[0, 1]`.
    pub mood: BTreeMap<String, f64>,
    pub time_of_day: Option<String>,
    pub environment: Option<String>,
    pub style: Option<String>,
    /// Free-text concept description, present once the concept stage ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Structured answer expected from the concept stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptDocument {
    pub description: String,
    #[serde(default)]
    pub mood: BTreeMap<String, f64>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

impl SceneContext {
    /// Seed a context from the raw prompt using keyword matches.
    pub fn from_prompt(prompt: &str) -> Self {
        let text = prompt.to_ascii_lowercase();
        let mut mood = BTreeMap::new();
        for label in tags::detect_labels(&text, tags::MOOD_TAGS, tags::MOOD_SYNONYMS) {
            mood.insert(label, 1.0);
        }
        let time_of_day = tags::detect_labels(&text, tags::TIME_TAGS, tags::TIME_SYNONYMS)
            .into_iter()
            .next();
        let environment = tags::detect_labels(&text, tags::ENVIRONMENT_TAGS, tags::ENVIRONMENT_SYNONYMS)
            .into_iter()
            .next();
        Self {
            prompt: prompt.trim().to_string(),
            mood,
            time_of_day,
            environment,
            style: None,
            description: None,
        }
    }

    /// Build the context for this attempt from the concept stage's answer.
    ///
    /// Labels the concept omits fall back to the seed context.
    pub fn from_concept(seed: &SceneContext, concept: &ConceptDocument) -> Self {
        let mut mood: BTreeMap<String, f64> = BTreeMap::new();
        for (label, weight) in &concept.mood {
            if label.trim().is_empty() || !weight.is_finite() || *weight <= 0.0 {
                continue;
            }
            let label = canonical(tags::MOOD_TAGS, tags::MOOD_SYNONYMS, normalize_label(label));
            let weight = weight.min(1.0);
            mood.entry(label)
                .and_modify(|existing| *existing = existing.max(weight))
                .or_insert(weight);
        }
        if mood.is_empty() {
            mood = seed.mood.clone();
        }
        Self {
            prompt: seed.prompt.clone(),
            mood,
            time_of_day: non_empty_label(concept.time_of_day.as_deref())
                .map(|label| canonical(tags::TIME_TAGS, tags::TIME_SYNONYMS, label))
                .or_else(|| seed.time_of_day.clone()),
            environment: non_empty_label(concept.environment.as_deref())
                .map(|label| canonical(tags::ENVIRONMENT_TAGS, tags::ENVIRONMENT_SYNONYMS, label))
                .or_else(|| seed.environment.clone()),
            style: non_empty_label(concept.style.as_deref()).or_else(|| seed.style.clone()),
            description: Some(concept.description.trim().to_string()),
        }
    }

    /// Same labels, different request text. Used when folding review notes back in.
    pub fn with_prompt(&self, prompt: String) -> Self {
        Self {
            prompt,
            mood: self.mood.clone(),
            time_of_day: self.time_of_day.clone(),
            environment: self.environment.clone(),
            style: self.style.clone(),
            description: None,
        }
    }

    /// Render the context as the prompt section shared by every stage.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let mood = if self.mood.is_empty() {
            "unspecified".to_string()
        } else {
            self.mood
                .iter()
                .map(|(label, weight)| format!("{label}={weight:.2}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "mood: {mood}");
        let _ = writeln!(
            out,
            "time of day: {}",
            self.time_of_day.as_deref().unwrap_or("unspecified")
        );
        let _ = writeln!(
            out,
            "environment: {}",
            self.environment.as_deref().unwrap_or("unspecified")
        );
        let _ = writeln!(out, "style: {}", self.style.as_deref().unwrap_or("unspecified"));
        out
    }
}

impl ConceptDocument {
    /// Plain-text form written to `concept.txt`.
    pub fn to_text(&self) -> String {
        let mut out = self.description.trim().to_string();
        out.push_str("\n\n");
        for (label, weight) in &self.mood {
            let _ = writeln!(out, "mood {label}: {weight:.2}");
        }
        if let Some(time) = &self.time_of_day {
            let _ = writeln!(out, "time of day: {time}");
        }
        if let Some(environment) = &self.environment {
            let _ = writeln!(out, "environment: {environment}");
        }
        if let Some(style) = &self.style {
            let _ = writeln!(out, "style: {style}");
        }
        out
    }
}

/// Lowercase a label and join words with underscores (`"Golden Hour"` -> `golden_hour`).
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Map a synonym onto its table label; unknown labels pass through unchanged.
fn canonical(table: tags::TagTable, synonyms: tags::SynonymTable, label: String) -> String {
    match tags::canonical_label(table, synonyms, &label) {
        Some(known) => known.to_string(),
        None => label,
    }
}

fn non_empty_label(label: Option<&str>) -> Option<String> {
    label.map(normalize_label).filter(|label| !label.is_empty())
}
