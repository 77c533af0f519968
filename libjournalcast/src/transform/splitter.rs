//! Sentence-based thread splitting

use std::sync::OnceLock;

use regex::Regex;

/// Per-post character limit used for threads
pub const DEFAULT_BOUND: usize = 260;

/// Characters kept free for the ` (i/N)` marker, widened when N outgrows it
pub const SUFFIX_RESERVE: usize = 10;

static SENTENCE_REGEX: OnceLock<Regex> = OnceLock::new();

fn sentences(text: &str) -> Vec<&str> {
    // Leading punctuation sticks to the first sentence; a text of nothing but
    // punctuation is one sentence.
    let regex = SENTENCE_REGEX.get_or_init(|| {
        Regex::new(r"[.!?]*[^.!?]+(?:[.!?]+|$)|[.!?]+").expect("Invalid regex pattern")
    });
    regex
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Break one over-long sentence at word boundaries, or mid-word when a single
/// word exceeds `limit`.
fn wrap(sentence: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > limit {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(limit).collect();
            word = word.chars().skip(limit).collect();
            pieces.push(head);
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > limit {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Split text into thread posts of at most `bound` characters each,
/// including the ` (i/N)` marker appended to every post.
///
/// Sentences are packed greedily in order. Empty input yields no posts.
pub fn split_into_thread(text: &str, bound: usize) -> Vec<String> {
    let mut reserve = SUFFIX_RESERVE;
    let chunks = loop {
        let limit = bound.saturating_sub(reserve).max(1);
        let chunks = pack(text, limit);
        let widest = marker(chunks.len(), chunks.len()).chars().count();
        // The reserve only grows, so this settles once it covers N.
        if widest <= reserve || limit == 1 {
            break chunks;
        }
        reserve = widest;
    };

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("{}{}", chunk, marker(i + 1, total)))
        .collect()
}

fn marker(index: usize, total: usize) -> String {
    format!(" ({}/{})", index, total)
}

fn pack(text: &str, limit: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        let parts = if sentence.chars().count() > limit {
            wrap(sentence, limit)
        } else {
            vec![sentence.to_string()]
        };

        for part in parts {
            let joined = if current.is_empty() {
                part.chars().count()
            } else {
                current.chars().count() + 1 + part.chars().count()
            };
            if joined > limit && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&part);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
