use anyhow::{Context, Result};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Keep the last `max_bytes` of a log, cut on a char boundary.
///
/// Host failures report at the bottom of their output, so excerpts keep the tail.
pub fn tail_excerpt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.trim().to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", text[start..].trim())
}

pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_string_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo", 2), "h");
        assert_eq!(truncate_string("short", 64), "short");
    }

    #[test]
    fn tail_excerpt_keeps_the_end() {
        let log = "line one\nline two\nError: missing camera";
        let excerpt = tail_excerpt(log, 21);
        assert!(excerpt.ends_with("Error: missing camera"));
        assert!(excerpt.starts_with("..."));
    }
}
