//! Recovery of JSON payloads from free-text model responses.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum JsonBlockError {
    #[error("response is empty")]
    Empty,
    #[error("no JSON object or array found in response")]
    NotFound,
    #[error("unbalanced JSON block starting at byte {0}")]
    Unbalanced(usize),
}

/// Extract the outermost JSON object or array from a model response.
///
/// Markdown fences are stripped first. The scan tracks string literals and
/// escapes, so braces inside strings do not affect nesting.
pub fn extract_json_block(response: &str) -> Result<&str, JsonBlockError> {
    let text = strip_fences(response.trim());
    if text.is_empty() {
        return Err(JsonBlockError::Empty);
    }

    let start = text.find(['{', '[']).ok_or(JsonBlockError::NotFound)?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Err(JsonBlockError::Unbalanced(start))
}

fn strip_fences(text: &str) -> &str {
    let mut t = text;
    if let Some(rest) = t.strip_prefix("```") {
        // Drop the info string (`json`, `JSON`, ...) on the fence line.
        t = rest.split_once('\n').map_or("", |(_, body)| body);
    }
    if let Some(body) = t.trim_end().strip_suffix("```") {
        t = body;
    }
    t.trim()
}
