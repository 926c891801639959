//! Cleanup of raw model responses before they are executed or parsed.
//!
//! Generation models wrap source in markdown fences, lead with prose, or
//! append explanations. These helpers recover the usable payload:
//! 1. Fenced code blocks (with or without a language tag)
//! 2. Balanced-bracket JSON extraction from mixed prose
//! 3. SVG document extraction by tag boundaries

use regex::Regex;

/// Strips surrounding prose and markdown fences from generated source.
///
/// If the response contains a fenced block, the content of the first fence is
/// returned. Otherwise the response is returned trimmed, on the assumption
/// that the model followed the "code only" instruction.
pub fn strip_code_fences(content: &str) -> String {
    // ```python\n...\n``` or ```\n...\n```
    let fence = Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\r?\n(.*?)```").expect("static regex");

    if let Some(captures) = fence.captures(content) {
        return captures[1].trim_end().to_string();
    }

    content.trim().to_string()
}

/// Extracts the first balanced JSON object from mixed content.
///
/// Scans for the first '{' and walks the text tracking brace depth and string
/// state. Returns `None` when no object opens or the braces never close
/// (truncated response).
pub fn extract_json_object(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let bytes = content.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Extracts a standalone SVG document from a response.
///
/// Returns the substring from the first `<svg` to the last `</svg>`, after
/// first unwrapping any markdown fence. Returns `None` when no complete SVG
/// element is present.
pub fn strip_to_svg(content: &str) -> Option<String> {
    let unfenced = strip_code_fences(content);
    let start = unfenced.find("<svg")?;
    let end = unfenced.rfind("</svg>")?;
    if end < start {
        return None;
    }
    Some(unfenced[start..end + "</svg>".len()].to_string())
}
