//! Static label-to-tag expansion tables.
//!
//! Unknown labels expand to nothing and therefore score zero.

/// One label and the catalog tags it expands to.
pub type TagTable = &'static [(&'static str, &'static [&'static str])];
/// Extra phrases that map onto a table label.
pub type SynonymTable = &'static [(&'static str, &'static str)];

pub const MOOD_TAGS: TagTable = &[
    ("cozy", &["indoor", "warm", "soft", "studio"]),
    ("dramatic", &["contrast", "dark", "sunset", "storm"]),
    ("calm", &["soft", "overcast", "nature", "clear"]),
    ("mysterious", &["night", "fog", "dark", "moody"]),
    ("cheerful", &["sunny", "clear", "bright", "day"]),
    ("romantic", &["sunset", "warm", "evening", "soft"]),
    ("energetic", &["bright", "sunny", "urban", "contrast"]),
    ("melancholic", &["overcast", "rain", "cool", "muted"]),
    ("eerie", &["night", "fog", "dark", "cool"]),
    ("epic", &["mountain", "clouds", "sunset", "contrast"]),
    ("clean", &["studio", "neutral", "soft", "indoor"]),
];

pub const MOOD_SYNONYMS: SynonymTable = &[
    ("peaceful", "calm"),
    ("serene", "calm"),
    ("happy", "cheerful"),
    ("spooky", "eerie"),
    ("creepy", "eerie"),
    ("moody", "mysterious"),
    ("sad", "melancholic"),
    ("gloomy", "melancholic"),
    ("majestic", "epic"),
    ("minimal", "clean"),
];

pub const TIME_TAGS: TagTable = &[
    ("sunrise", &["sunrise", "dawn", "morning", "warm"]),
    ("morning", &["morning", "day", "clear", "soft"]),
    ("noon", &["day", "noon", "bright", "clear"]),
    ("afternoon", &["day", "afternoon", "clear"]),
    ("golden_hour", &["sunset", "golden", "warm", "evening"]),
    ("sunset", &["sunset", "dusk", "evening", "warm"]),
    ("evening", &["evening", "dusk", "warm"]),
    ("blue_hour", &["dusk", "twilight", "cool"]),
    ("night", &["night", "dark", "moon", "stars"]),
];

pub const TIME_SYNONYMS: SynonymTable = &[
    ("dawn", "sunrise"),
    ("daybreak", "sunrise"),
    ("midday", "noon"),
    ("dusk", "sunset"),
    ("twilight", "blue_hour"),
    ("midnight", "night"),
    ("nighttime", "night"),
];

pub const ENVIRONMENT_TAGS: TagTable = &[
    ("indoor", &["indoor", "studio", "interior", "room"]),
    ("studio", &["studio", "indoor", "neutral"]),
    ("outdoor", &["outdoor", "nature", "sky"]),
    ("urban", &["urban", "city", "street", "outdoor"]),
    ("nature", &["nature", "forest", "trees", "outdoor"]),
    ("beach", &["beach", "sea", "coast", "outdoor"]),
    ("mountain", &["mountain", "outdoor", "nature"]),
    ("desert", &["desert", "outdoor", "dry"]),
];

pub const ENVIRONMENT_SYNONYMS: SynonymTable = &[
    ("room", "indoor"),
    ("interior", "indoor"),
    ("inside", "indoor"),
    ("outside", "outdoor"),
    ("exterior", "outdoor"),
    ("city", "urban"),
    ("street", "urban"),
    ("forest", "nature"),
    ("woods", "nature"),
    ("jungle", "nature"),
    ("coast", "beach"),
    ("seaside", "beach"),
];

/// Tags a label expands to in `table`; empty for unknown labels.
pub fn expand(table: TagTable, label: &str) -> &'static [&'static str] {
    table
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, tags)| *tags)
        .unwrap_or(&[])
}

/// Table label for `label`, accepting the label itself or one of its synonyms.
/// `label` must already be normalized (lowercase, underscores).
pub fn canonical_label(table: TagTable, synonyms: SynonymTable, label: &str) -> Option<&'static str> {
    table
        .iter()
        .map(|(name, _)| *name)
        .find(|name| *name == label)
        .or_else(|| {
            synonyms
                .iter()
                .find(|(phrase, _)| *phrase == label)
                .map(|(_, name)| *name)
        })
}

/// Labels from `table` mentioned in `text` (already lowercased), in order of
/// first mention.
pub fn detect_labels(text: &str, table: TagTable, synonyms: SynonymTable) -> Vec<String> {
    let mut hits: Vec<(usize, &str)> = Vec::new();
    for (label, _) in table {
        let phrase = label.replace('_', " ");
        if let Some(pos) = find_word(text, &phrase) {
            hits.push((pos, *label));
        }
    }
    for (phrase, label) in synonyms {
        if let Some(pos) = find_word(text, phrase) {
            hits.push((pos, *label));
        }
    }
    hits.sort_by_key(|(pos, _)| *pos);

    let mut labels: Vec<String> = Vec::new();
    for (_, label) in hits {
        if !labels.iter().any(|seen| seen == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

/// Byte offset of the first whole-word occurrence of `phrase` in `text`.
fn find_word(text: &str, phrase: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = text[from..].find(phrase) {
        let start = from + offset;
        let end = start + phrase.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(start);
        }
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_labels_and_ignores_unknown() {
        assert_eq!(expand(MOOD_TAGS, "cozy"), ["indoor", "warm", "soft", "studio"]);
        assert_eq!(expand(TIME_TAGS, "sunset"), ["sunset", "dusk", "evening", "warm"]);
        assert!(expand(MOOD_TAGS, "bewildered").is_empty());
    }

    #[test]
    fn canonical_label_maps_synonyms_onto_table_labels() {
        assert_eq!(canonical_label(TIME_TAGS, TIME_SYNONYMS, "dusk"), Some("sunset"));
        assert_eq!(canonical_label(TIME_TAGS, TIME_SYNONYMS, "golden_hour"), Some("golden_hour"));
        assert_eq!(canonical_label(ENVIRONMENT_TAGS, ENVIRONMENT_SYNONYMS, "city"), Some("urban"));
        assert_eq!(canonical_label(MOOD_TAGS, MOOD_SYNONYMS, "whimsical"), None);
    }

    #[test]
    fn detects_whole_words_only() {
        assert!(detect_labels("a nightstand by the bed", TIME_TAGS, TIME_SYNONYMS).is_empty());
        assert_eq!(
            detect_labels("night falls over the city at dusk", TIME_TAGS, TIME_SYNONYMS),
            ["night", "sunset"]
        );
    }

    #[test]
    fn multi_word_labels_match_spaced_text() {
        assert_eq!(
            detect_labels("portrait at golden hour", TIME_TAGS, TIME_SYNONYMS),
            ["golden_hour"]
        );
    }
}
