//! Text normalisation shared by the matcher and the clarification channel.

use crate::protocol::Position;
use regex::Regex;
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?(\d+)(?:st|nd|rd|th)?$").unwrap());

/// Words that carry no identifying weight in a target description.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "field", "box", "button", "input", "textbox", "link", "on", "in", "into",
    "of", "for", "please", "my", "this", "that", "one", "option", "item", "area", "bar",
];

const ORDINALS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
    ("top", 1),
    ("latest", 1),
    ("newest", 1),
];

pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased alphanumeric tokens in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Tokens with stop words removed, duplicates dropped.
pub fn content_tokens(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if STOP_WORDS.contains(&token.as_str()) || out.contains(&token) {
            continue;
        }
        out.push(token);
    }
    out
}

/// Parse an ordinal reference such as "second", "2nd", "#3", "the last one".
pub fn parse_ordinal(text: &str) -> Option<Position> {
    let tokens = tokenize(text);
    if tokens.iter().any(|t| t == "last" || t == "bottom") {
        return Some(Position::Last);
    }
    for token in &tokens {
        if let Some((_, n)) = ORDINALS.iter().find(|(word, _)| word == token) {
            return Some(Position::Nth(*n));
        }
    }
    let trimmed = text.trim();
    if let Some(caps) = NUMBER_RE.captures(trimmed) {
        return caps[1]
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .map(Position::Nth);
    }
    // "option 2", "number 3"
    tokens
        .iter()
        .filter_map(|t| NUMBER_RE.captures(t).and_then(|c| c[1].parse::<usize>().ok()))
        .find(|n| *n >= 1)
        .filter(|_| tokens.len() <= 3)
        .map(Position::Nth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  Leaving   FROM "), "leaving from");
    }

    #[test]
    fn test_content_tokens_drop_stop_words() {
        assert_eq!(content_tokens("the origin city field"), vec!["origin", "city"]);
        assert_eq!(content_tokens("Search button"), vec!["search"]);
        assert!(content_tokens("").is_empty());
    }

    #[test]
    fn test_parse_ordinal() {
        assert_eq!(parse_ordinal("the second one"), Some(Position::Nth(2)));
        assert_eq!(parse_ordinal("3rd"), Some(Position::Nth(3)));
        assert_eq!(parse_ordinal("#4"), Some(Position::Nth(4)));
        assert_eq!(parse_ordinal("option 2"), Some(Position::Nth(2)));
        assert_eq!(parse_ordinal("the last result"), Some(Position::Last));
        assert_eq!(parse_ordinal("Istanbul"), None);
        assert_eq!(parse_ordinal("0"), None);
    }
}
