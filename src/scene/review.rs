//! Review outcome parsing.
//!
//! The review stage answers with JSON; a bare `rating: N` line is accepted as
//! a fallback so a chatty reviewer still yields a usable score.
use crate::error::{ContractViolation, GenerationError, StageError};
use crate::lm::response::extract_json;
use crate::stages::StageId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 10;

/// Rating, feedback, and per-stage suggestions for one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub rating: u8,
    pub feedback: String,
    pub suggestions: BTreeMap<StageId, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    rating: serde_json::Value,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    suggestions: BTreeMap<String, SuggestionList>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SuggestionList {
    One(String),
    Many(Vec<String>),
}

impl ReviewOutcome {
    /// Parse a reviewer answer for an iteration in which `ran` stages executed.
    ///
    /// Unreadable answers are `Unparsable` (retryable); a rating outside 1-10
    /// is a contract violation.
    pub fn parse(text: &str, ran: &[StageId]) -> Result<Self, StageError> {
        let json_text = extract_json(text);
        match serde_json::from_str::<RawReview>(json_text) {
            Ok(raw) => Self::from_raw(raw, ran),
            Err(err) => {
                let Some(rating) = rating_from_text(text) else {
                    return Err(GenerationError::Unparsable(format!(
                        "review is neither JSON nor contains a rating: {err}"
                    ))
                    .into());
                };
                let rating = check_rating(rating)?;
                Ok(Self {
                    rating,
                    feedback: text.trim().to_string(),
                    suggestions: BTreeMap::new(),
                })
            }
        }
    }

    fn from_raw(raw: RawReview, ran: &[StageId]) -> Result<Self, StageError> {
        let rating = match &raw.rating {
            serde_json::Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
            serde_json::Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            GenerationError::Unparsable(format!("review rating is not an integer: {}", raw.rating))
        })?;
        let rating = check_rating(rating)?;

        let mut suggestions = BTreeMap::new();
        for (key, list) in raw.suggestions {
            let items: Vec<String> = match list {
                SuggestionList::One(item) => vec![item],
                SuggestionList::Many(items) => items,
            }
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
            if items.is_empty() {
                continue;
            }
            let stage: StageId = key.parse().map_err(|_| {
                GenerationError::Unparsable(format!("review suggests changes to unknown stage {key:?}"))
            })?;
            if !ran.contains(&stage) {
                return Err(GenerationError::Unparsable(format!(
                    "review suggests changes to stage {stage}, which did not run"
                ))
                .into());
            }
            suggestions.insert(stage, items);
        }

        Ok(Self {
            rating,
            feedback: raw.feedback.trim().to_string(),
            suggestions,
        })
    }

    /// Suggestions addressed to one stage (empty when there are none).
    pub fn suggestions_for(&self, stage: StageId) -> &[String] {
        self.suggestions
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn check_rating(rating: i64) -> Result<u8, ContractViolation> {
    if rating < i64::from(MIN_RATING) || rating > i64::from(MAX_RATING) {
        return Err(ContractViolation::RatingOutOfRange(rating));
    }
    Ok(rating as u8)
}

fn rating_from_text(text: &str) -> Option<i64> {
    static RATING: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = RATING
        .get_or_init(|| Regex::new(r"(?i)\brating\b\s*[:=]?\s*(-?\d+)\s*(?:/\s*10)?").ok())
        .as_ref()?;
    pattern.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAN: [StageId; 4] = [
        StageId::Concept,
        StageId::Geometry,
        StageId::Lighting,
        StageId::Review,
    ];

    #[test]
    fn parses_json_review_with_suggestions() {
        let text = r#"```json
{"rating": 6, "feedback": "too dark", "suggestions": {"lighting": ["brighter sky"], "geometry": "add a rug"}}
```"#;
        let review = ReviewOutcome::parse(text, &RAN).unwrap();
        assert_eq!(review.rating, 6);
        assert_eq!(review.feedback, "too dark");
        assert_eq!(review.suggestions_for(StageId::Lighting), ["brighter sky"]);
        assert_eq!(review.suggestions_for(StageId::Geometry), ["add a rug"]);
        assert!(review.suggestions_for(StageId::Materials).is_empty());
    }

    #[test]
    fn rating_out_of_range_is_contract_violation() {
        let err = ReviewOutcome::parse(r#"{"rating": 11}"#, &RAN).unwrap_err();
        assert_eq!(
            err,
            StageError::Contract(ContractViolation::RatingOutOfRange(11))
        );
        let err = ReviewOutcome::parse("Rating: 0/10", &RAN).unwrap_err();
        assert_eq!(err, StageError::Contract(ContractViolation::RatingOutOfRange(0)));
    }

    #[test]
    fn falls_back_to_rating_line() {
        let review = ReviewOutcome::parse("Looks decent.\nRating: 7/10", &RAN).unwrap();
        assert_eq!(review.rating, 7);
        assert!(review.suggestions.is_empty());
    }

    #[test]
    fn missing_rating_is_unparsable() {
        let err = ReviewOutcome::parse("no score here", &RAN).unwrap_err();
        assert!(matches!(err, StageError::Generation(GenerationError::Unparsable(_))));
    }

    #[test]
    fn suggestions_for_idle_stage_are_rejected() {
        let text = r#"{"rating": 5, "suggestions": {"materials": ["rougher wood"]}}"#;
        let err = ReviewOutcome::parse(text, &RAN).unwrap_err();
        assert!(matches!(err, StageError::Generation(GenerationError::Unparsable(_))));
    }

    #[test]
    fn string_rating_is_accepted() {
        let review = ReviewOutcome::parse(r#"{"rating": "8", "feedback": "ok"}"#, &RAN).unwrap();
        assert_eq!(review.rating, 8);
    }
}
