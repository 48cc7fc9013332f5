//! Shared text helpers for pulling JSON out of model responses.

/// Extract the outermost JSON object from text that may contain other content.
///
/// Uses brace counting, skipping braces that appear inside string literals.
pub fn extract_json_object(text: &str) -> Option<String> {
    extract_balanced(text, '{', '}')
}

/// Extract the outermost JSON array from text that may contain other content.
pub fn extract_json_array(text: &str) -> Option<String> {
    extract_balanced(text, '[', ']')
}

/// Extract whichever JSON container (object or array) opens first.
pub fn extract_json_value(text: &str) -> Option<String> {
    match (text.find('{'), text.find('[')) {
        (Some(o), Some(a)) if a < o => extract_json_array(text),
        (Some(_), _) => extract_json_object(text),
        (None, Some(_)) => extract_json_array(text),
        (None, None) => None,
    }
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + ch.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove a surrounding markdown code fence (```json ... ```), if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Truncate text to at most `max_chars` characters for log output.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
