//! Pulling structured payloads out of free-form LM responses.

/// Extract a JSON payload, stripping markdown fences when present.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(body) = fenced_block(text, "json") {
        return body;
    }
    if let Some(body) = fenced_block(text, "") {
        return body;
    }

    // Prose around a bare object: take the outermost braces.
    if !text.starts_with('{') {
        if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
            if start < end {
                return &text[start..=end];
            }
        }
    }
    text
}

/// Extract a Python script body, stripping markdown fences when present.
pub fn extract_code(text: &str) -> &str {
    let text = text.trim();
    fenced_block(text, "python")
        .or_else(|| fenced_block(text, "py"))
        .or_else(|| fenced_block(text, ""))
        .unwrap_or(text)
}

/// Body of the first ```` ```<lang> ```` fence. An empty `lang` matches any
/// fence and skips whatever language identifier follows it.
fn fenced_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let opener = format!("```{lang}");
    let mut search = 0;
    while let Some(found) = text[search..].find(&opener) {
        let start = search + found + opener.len();
        let rest = &text[start..];
        // "```py" must not match "```python".
        let line_end = rest.find('\n').unwrap_or(rest.len());
        let tag = rest[..line_end].trim();
        if !lang.is_empty() && !tag.is_empty() {
            search = start;
            continue;
        }
        let body_start = start + line_end;
        let end = text[body_start..].find("```")?;
        return Some(text[body_start..body_start + end].trim());
    }
    None
}
