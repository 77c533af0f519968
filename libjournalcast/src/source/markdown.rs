//! Strip Markdown formatting from journal bodies, keeping text and line breaks

use std::sync::OnceLock;

use regex::Regex;

static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn rules() -> &'static [(Regex, &'static str)] {
    RULES.get_or_init(|| {
        [
            // fenced code blocks go first so their contents are not rewritten
            (r"(?s)```.*?```", ""),
            // images
            (r"!\[[^\]]*\]\([^)]*\)", ""),
            // links keep their text
            (r"\[([^\]]+)\]\([^)]+\)", "$1"),
            (r"\*\*([^*]+)\*\*", "$1"),
            (r"__([^_]+)__", "$1"),
            (r"\*([^*\n]+)\*", "$1"),
            (r"\b_([^_\n]+)_\b", "$1"),
            (r"`([^`]+)`", "$1"),
            (r"(?m)^#{1,6}\s+", ""),
            (r"(?m)^>\s?", ""),
            (r"(?m)^[ \t]*[-*+]\s+", ""),
            (r"(?m)^[ \t]*\d+\.\s+", ""),
            (r"\n{3,}", "\n\n"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("Invalid regex pattern"),
                replacement,
            )
        })
        .collect()
    })
}

/// Plain text version of a Markdown body
pub fn clean_markdown(text: &str) -> String {
    let mut cleaned = text.replace("\r\n", "\n");
    for (regex, replacement) in rules() {
        cleaned = regex.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_string()
}
