//! Word equivalence used by token overlap scoring.

/// Words that name the same kind of field on travel and search forms.
const GROUPS: &[&[&str]] = &[
    &["origin", "from", "departure", "departing", "leaving", "depart"],
    &["destination", "to", "arrival", "arriving", "where", "going"],
    &["search", "find", "lookup", "query"],
    &["submit", "send", "go", "confirm", "done", "apply", "ok"],
    &["date", "when", "day"],
    &["guests", "guest", "travelers", "travellers", "passengers", "people"],
    &["email", "mail"],
    &["password", "passcode", "pwd"],
    &["username", "login", "user"],
    &["next", "continue", "forward"],
    &["back", "previous", "prev"],
    &["close", "dismiss"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TokenMatch {
    Fuzzy,
    Synonym,
    Exact,
}

pub fn are_synonyms(a: &str, b: &str) -> bool {
    GROUPS
        .iter()
        .any(|group| group.contains(&a) && group.contains(&b))
}

/// Compare two normalised tokens. Near spellings only count for words of
/// four or more characters.
pub fn token_match(a: &str, b: &str, fuzzy_threshold: f64) -> Option<TokenMatch> {
    if a == b {
        return Some(TokenMatch::Exact);
    }
    if are_synonyms(a, b) {
        return Some(TokenMatch::Synonym);
    }
    if a.chars().count() >= 4
        && b.chars().count() >= 4
        && strsim::jaro_winkler(a, b) >= fuzzy_threshold
    {
        return Some(TokenMatch::Fuzzy);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonym_groups() {
        assert!(are_synonyms("origin", "from"));
        assert!(are_synonyms("to", "destination"));
        assert!(!are_synonyms("origin", "to"));
    }

    #[test]
    fn test_token_match_kinds() {
        assert_eq!(token_match("search", "search", 0.9), Some(TokenMatch::Exact));
        assert_eq!(token_match("from", "origin", 0.9), Some(TokenMatch::Synonym));
        assert_eq!(
            token_match("adress", "address", 0.9),
            Some(TokenMatch::Fuzzy)
        );
        assert_eq!(token_match("to", "go", 0.9), None);
        assert_eq!(token_match("city", "from", 0.9), None);
    }
}
