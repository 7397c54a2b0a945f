//! Text tokenization shared by the packet free-text index and the tag
//! extraction heuristic. Deliberately lexical: real semantic similarity is
//! an external concern.

use std::collections::HashMap;

/// Minimum keyword length kept by [`extract_terms`]; shorter words carry
/// too little signal for frequency ranking.
pub const MIN_KEYWORD_LEN: usize = 4;

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Frequency-ranked keywords: punctuation stripped, lowercased, words of
/// three characters or fewer dropped. Ties break alphabetically so the
/// ranking is deterministic.
pub fn extract_terms(text: &str) -> Vec<(String, usize)> {
    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        if token.chars().count() < MIN_KEYWORD_LEN {
            continue;
        }
        *frequencies.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = frequencies.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// AND-of-terms substring match: every whitespace-separated term of
/// `query` must appear somewhere in the (already lowercased) blob.
pub fn matches_all_terms(blob: &str, query: &str) -> bool {
    query
        .split_whitespace()
        .all(|term| blob.contains(&term.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("Attention, scores! (raw) graph-based");
        assert_eq!(tokens, vec!["attention", "scores", "raw", "graph", "based"]);
    }

    #[test]
    fn test_extract_terms_ranks_by_frequency() {
        let terms = extract_terms("graph graph graph store store tag");
        // "tag" is dropped (3 chars), "graph" outranks "store"
        assert_eq!(
            terms,
            vec![("graph".to_string(), 3), ("store".to_string(), 2)]
        );
    }

    #[test]
    fn test_extract_terms_tie_breaks_alphabetically() {
        let terms = extract_terms("zebra apple zebra apple");
        assert_eq!(terms[0].0, "apple");
        assert_eq!(terms[1].0, "zebra");
    }

    #[test_case("machine capture", true; "all terms present")]
    #[test_case("LEARN", true; "case-insensitive substring")]
    #[test_case("machine database", false; "one term missing fails the AND")]
    #[test_case("", true; "empty query matches everything")]
    fn test_matches_all_terms(query: &str, expected: bool) {
        let blob = "machine learning pipeline for capture records";
        assert_eq!(matches_all_terms(blob, query), expected);
    }
}
