//! Shared utility functions for the foundry crate.

/// Extract a JSON object from text that may contain other content.
///
/// Finds the outermost `{ ... }` by brace counting. Braces inside JSON
/// string literals are skipped, since generated source code embedded in a
/// response routinely contains unbalanced ones.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Strip a surrounding markdown code fence (```lang ... ```) if present.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the language tag line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim_end().to_string()
}

/// Lowercase `title`, collapse runs of non-alphanumerics into `sep`, and cap
/// the result at `max_len` bytes.
pub fn slugify(title: &str, sep: char, max_len: usize) -> String {
    let slug: String = title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(&sep.to_string());
    if slug.len() > max_len {
        let end = slug
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= max_len)
            .last()
            .unwrap_or(0);
        slug[..end]
            .trim_end_matches(sep)
            .to_string()
    } else {
        slug
    }
}
