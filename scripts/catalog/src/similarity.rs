//! Name similarity used by duplicate detection.

/// Two names are considered the same artist above this normalized
/// Levenshtein similarity.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Normalized Levenshtein similarity between two names, case-insensitive.
/// `1.0` means equal, `0.0` means nothing in common.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Whether two artist names plausibly refer to the same artist: exact
/// case-insensitive equality, or similarity above the threshold.
pub fn names_match(a: &str, b: &str) -> bool {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    a_lower == b_lower || strsim::normalized_levenshtein(&a_lower, &b_lower) > NAME_SIMILARITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_one() {
        assert_eq!(name_similarity("Shpongle", "Shpongle"), 1.0);
    }

    #[test]
    fn similarity_is_case_insensitive() {
        assert_eq!(name_similarity("SHPONGLE", "shpongle"), 1.0);
        assert!(names_match("Boris Brejcha", "boris brejcha"));
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("Shpongle", "Shpongled"),
            ("Amelie Lens", "Amelie Lenz"),
            ("Ott", "Otto"),
        ];
        for (a, b) in pairs {
            assert_eq!(name_similarity(a, b), name_similarity(b, a));
        }
    }

    #[test]
    fn near_duplicates_match() {
        // one edit over nine characters: 1 - 1/9 ≈ 0.889
        assert!(names_match("Shpongle", "Shpongles"));
    }

    #[test]
    fn distinct_names_do_not_match() {
        assert!(!names_match("Ott", "Shpongle"));
        // one edit over three characters: 1 - 1/4 = 0.75, below threshold
        assert!(!names_match("Ott", "Otts"));
    }
}
