//! Heuristic content → `MemoryType` classifier (§4.3).
//!
//! Counts word-boundary, case-insensitive matches of four pattern sets
//! (rule, procedure, preference, episode). Ties go to the lowest-index type
//! in `MemoryType::CLASSIFIER_ORDER`; no match at all falls back to `fact`.
//! Word-boundary matching is mandatory — substring matching on "must" would
//! also fire on "mustache".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::MemoryType;

/// Build a case-insensitive, word-boundary alternation regex from a list of
/// literal phrases. Phrases may contain internal spaces (e.g. "always
/// validate"); each is escaped so it is matched literally.
fn boundary_set(words: &[&str]) -> Regex {
    let alts: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    let pattern = format!(r"(?i)\b(?:{})\b", alts.join("|"));
    Regex::new(&pattern).expect("valid classifier pattern")
}

static RULE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    boundary_set(&[
        "must",
        "must not",
        "never",
        "always",
        "always validate",
        "should never",
        "required",
        "mandatory",
        "forbidden",
        "not allowed",
        "invariant",
        "rule",
    ])
});

static PROCEDURE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    boundary_set(&[
        "step",
        "steps",
        "first",
        "then",
        "next",
        "finally",
        "how to",
        "procedure",
        "run",
        "execute",
        "to do this",
        "workflow",
    ])
});

static PREFERENCE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    boundary_set(&[
        "prefer",
        "prefers",
        "preference",
        "like",
        "likes",
        "dislike",
        "dislikes",
        "favorite",
        "rather",
        "instead of",
        "i want",
        "i'd like",
    ])
});

static EPISODE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    boundary_set(&[
        "yesterday",
        "today",
        "last week",
        "earlier",
        "when we",
        "we deployed",
        "we fixed",
        "happened",
        "occurred",
        "at the time",
        "during",
    ])
});

/// Maps free text to a `MemoryType` using word-boundary, case-insensitive
/// match counts (§4.3). Pure function of its input; holds no state.
pub struct Classifier;

impl Classifier {
    pub fn classify(text: &str) -> MemoryType {
        let counts = [
            (MemoryType::Rule, RULE_PATTERNS.find_iter(text).count()),
            (
                MemoryType::Procedure,
                PROCEDURE_PATTERNS.find_iter(text).count(),
            ),
            (
                MemoryType::Preference,
                PREFERENCE_PATTERNS.find_iter(text).count(),
            ),
            (
                MemoryType::Episode,
                EPISODE_PATTERNS.find_iter(text).count(),
            ),
        ];

        // Ties favor the lowest-index type, so this must keep the first
        // maximum seen rather than `Iterator::max_by_key`, which keeps the
        // last.
        let mut best: Option<(MemoryType, usize)> = None;
        for (memory_type, count) in counts {
            if count > 0 && best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((memory_type, count));
            }
        }

        match best {
            Some((memory_type, _)) => memory_type,
            None => MemoryType::Fact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rule() {
        assert_eq!(
            Classifier::classify("We MUST always validate input."),
            MemoryType::Rule
        );
    }

    #[test]
    fn classify_fallback_is_fact() {
        assert_eq!(
            Classifier::classify("The capital of France is Paris."),
            MemoryType::Fact
        );
    }

    #[test]
    fn classify_procedure() {
        assert_eq!(
            Classifier::classify("First run the build, then deploy the step."),
            MemoryType::Procedure
        );
    }

    #[test]
    fn classify_preference() {
        assert_eq!(
            Classifier::classify("I prefer tabs over spaces."),
            MemoryType::Preference
        );
    }

    #[test]
    fn classify_episode() {
        assert_eq!(
            Classifier::classify("Yesterday we deployed v2.0 and it broke prod."),
            MemoryType::Episode
        );
    }

    #[test]
    fn word_boundary_avoids_substring_false_positive() {
        // "must" should not fire on "mustache".
        assert_eq!(Classifier::classify("He grew a mustache."), MemoryType::Fact);
    }

    #[test]
    fn ties_favor_lowest_index_type() {
        // One rule hit ("must"), one procedure hit ("run"): rule wins as the
        // lower-index type in CLASSIFIER_ORDER.
        assert_eq!(
            Classifier::classify("You must run this."),
            MemoryType::Rule
        );
    }
}
