use serde_json::Value;

/// Best-effort extraction of a JSON value from free-form model output.
///
/// Tries, in order: the trimmed text as-is, the body of a fenced code block,
/// and the outermost `{ ... }` span. Malformed output yields `None`.
pub fn parse_structured(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(body) = strip_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return Some(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }

    None
}

/// Body of a ```` ```lang ... ``` ```` block, with the info string dropped.
fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    Some(body.trim())
}
