//! Extraction of program text from model replies.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("fence regex is valid"));

/// Pull the program out of `text`.
///
/// Models wrap code in markdown fences despite being told not to. When fenced
/// blocks are present the longest one wins; an unterminated opening fence
/// keeps everything after it; otherwise the trimmed text is returned as-is.
pub fn extract_code(text: &str) -> String {
    let longest = FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .max_by_key(|body| body.len());
    if let Some(body) = longest {
        return body.trim_matches('\n').to_string();
    }

    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        return body.trim_end_matches('`').trim_matches('\n').to_string();
    }
    trimmed.to_string()
}
