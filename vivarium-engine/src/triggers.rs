//! Trigger heuristics: praise detection, level cadence, memory extraction.
//!
//! Pure functions over user input text. Matching is deliberately loose
//! (case-insensitive substring) and the keyword list comes from
//! configuration, so callers can tighten it without touching the engine.

/// Whether the input contains any praise keyword.
/// Keywords are expected lowercase; the input is lowercased for matching.
pub fn contains_praise(text: &str, keywords: &[String]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

/// Whether a level-up fires after a completed exchange: every `every`-th
/// exchange, or whenever the input praised the agent.
pub fn level_up_due(turn_count: usize, every: usize, praised: bool) -> bool {
    (every > 0 && turn_count % every == 0) || praised
}

/// Extract the memory value from the input: everything after the first
/// case-insensitive occurrence of `trigger`, in original case, trimmed.
/// Returns `None` when the trigger phrase is absent.
pub fn extract_memory(text: &str, trigger: &str) -> Option<String> {
    let start = find_ignore_ascii_case(text, trigger)?;
    Some(text[start + trigger.len()..].trim().to_string())
}

/// Byte offset of the first match of `needle` in `haystack`, ignoring ASCII
/// case. Operates on bytes so the offset is exact; a full match of a valid
/// UTF-8 needle always lands on char boundaries.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_core::DEFAULT_PRAISE_KEYWORDS;

    fn keywords() -> Vec<String> {
        DEFAULT_PRAISE_KEYWORDS.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_praise_is_case_insensitive() {
        assert!(contains_praise("THANKS a lot!", &keywords()));
        assert!(contains_praise("that was Amazing", &keywords()));
        assert!(!contains_praise("tell me more", &keywords()));
    }

    #[test]
    fn test_praise_matches_substrings_loosely() {
        // Known loose heuristic: "thanks" matches inside a negation too
        assert!(contains_praise("thanks but no thanks", &keywords()));
    }

    #[test]
    fn test_level_cadence() {
        // Trigger only on every third completed exchange
        assert!(!level_up_due(1, 3, false));
        assert!(!level_up_due(2, 3, false));
        assert!(level_up_due(3, 3, false));
        assert!(!level_up_due(4, 3, false));
        assert!(level_up_due(6, 3, false));
    }

    #[test]
    fn test_praise_overrides_cadence() {
        assert!(level_up_due(1, 3, true));
        assert!(level_up_due(2, 3, true));
    }

    #[test]
    fn test_extract_memory_basic() {
        let value = extract_memory("please remember that the sky is blue", "remember that");
        assert_eq!(value, Some("the sky is blue".to_string()));
    }

    #[test]
    fn test_extract_memory_case_insensitive_trigger() {
        let value = extract_memory("Remember That Fridays are short", "remember that");
        assert_eq!(value, Some("Fridays are short".to_string()));
    }

    #[test]
    fn test_extract_memory_preserves_value_case() {
        let value = extract_memory("remember that The Answer Is 42", "remember that");
        assert_eq!(value, Some("The Answer Is 42".to_string()));
    }

    #[test]
    fn test_extract_memory_first_occurrence() {
        let value = extract_memory(
            "remember that you should remember that too",
            "remember that",
        );
        assert_eq!(value, Some("you should remember that too".to_string()));
    }

    #[test]
    fn test_extract_memory_absent_trigger() {
        assert_eq!(extract_memory("the sky is blue", "remember that"), None);
    }

    #[test]
    fn test_extract_memory_trailing_trigger_is_empty_value() {
        let value = extract_memory("remember that", "remember that");
        assert_eq!(value, Some(String::new()));
    }

    #[test]
    fn test_extract_memory_with_multibyte_text() {
        let value = extract_memory("🦊 remember that foxes are orange", "remember that");
        assert_eq!(value, Some("foxes are orange".to_string()));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Extraction SHALL strip the trigger and surrounding whitespace from
        /// any ASCII value.
        #[test]
        fn prop_extract_round_trips_value(value in "[a-zA-Z0-9 ]{0,40}") {
            let text = format!("please remember that {}", value);
            let extracted = extract_memory(&text, "remember that").unwrap();
            prop_assert_eq!(extracted, value.trim().to_string());
        }

        /// Without the trigger phrase extraction SHALL never fire.
        #[test]
        fn prop_extract_none_without_trigger(text in "[a-qs-z0-9 ]{0,60}") {
            // Alphabet excludes 'r' so the trigger cannot appear
            prop_assert_eq!(extract_memory(&text, "remember that"), None);
        }

        /// The cadence rule SHALL be exactly divisibility-or-praise.
        #[test]
        fn prop_cadence_matches_divisibility(turns in 1usize..100, praised in any::<bool>()) {
            let due = level_up_due(turns, 3, praised);
            prop_assert_eq!(due, turns % 3 == 0 || praised);
        }
    }
}
