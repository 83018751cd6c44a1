// failure-tracker-rs/src/patterns.rs
// Registry of heuristic failure patterns evaluated against model output.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{FailureCategory, FailureSeverity};

/// Predicate over `(output, input)`.
pub type PatternPredicate = fn(output: &str, input: &str) -> bool;

/// How a pattern decides whether it fires.
pub enum PatternRule {
    /// Fires when the regex matches anywhere in the output.
    Regex(Regex),
    /// Fires when the computed condition holds.
    Predicate(PatternPredicate),
}

impl PatternRule {
    pub fn matches(&self, output: &str, input: &str) -> bool {
        match self {
            PatternRule::Regex(re) => re.is_match(output),
            PatternRule::Predicate(predicate) => predicate(output, input),
        }
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternRule::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            PatternRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A named rule mapping a response/input pair to a suspected failure.
#[derive(Debug)]
pub struct FailurePattern {
    pub name: &'static str,
    pub rule: PatternRule,
    pub category: FailureCategory,
    pub severity: FailureSeverity,
    pub confidence: f64,
}

impl FailurePattern {
    fn regex(
        name: &'static str,
        pattern: &str,
        category: FailureCategory,
        severity: FailureSeverity,
        confidence: f64,
    ) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(re) => Some(Self {
                name,
                rule: PatternRule::Regex(re),
                category,
                severity,
                confidence,
            }),
            Err(err) => {
                tracing::error!(pattern.name = name, error = %err, "invalid failure pattern; skipping");
                None
            }
        }
    }

    fn predicate(
        name: &'static str,
        predicate: PatternPredicate,
        category: FailureCategory,
        severity: FailureSeverity,
        confidence: f64,
    ) -> Option<Self> {
        Some(Self {
            name,
            rule: PatternRule::Predicate(predicate),
            category,
            severity,
            confidence,
        })
    }
}

static REGISTRY: Lazy<Vec<FailurePattern>> = Lazy::new(|| {
    use FailureCategory as C;
    use FailureSeverity as S;

    [
        FailurePattern::predicate("Empty Response", is_blank, C::SchemaMismatch, S::High, 0.9),
        FailurePattern::regex(
            "Generic Error Message",
            r"(?i)^(I can['’]t|I['’]m unable to|I don['’]t know|I['’]m sorry, but)",
            C::IrrelevantResponse,
            S::Medium,
            0.8,
        ),
        FailurePattern::predicate(
            "Repetitive Content",
            is_repetitive,
            C::LogicError,
            S::Medium,
            0.7,
        ),
        FailurePattern::predicate(
            "Off-topic Response",
            is_off_topic,
            C::IrrelevantResponse,
            S::High,
            0.8,
        ),
        FailurePattern::regex(
            "Incomplete Response",
            r"(?i)(\.\.\.|…)\s*$|incomplete|truncated|cut off",
            C::TokenLimitExceeded,
            S::Medium,
            0.8,
        ),
        FailurePattern::regex(
            "JSON Parse Error",
            r"(?i)invalid json|json parse error|malformed json",
            C::InvalidFormat,
            S::High,
            0.9,
        ),
        FailurePattern::regex(
            "Timeout Error",
            r"(?i)timeout|timed out|request timeout",
            C::Timeout,
            S::High,
            0.9,
        ),
        FailurePattern::regex(
            "Rate Limit Error",
            r"(?i)rate limit|too many requests|quota exceeded",
            C::RateLimitExceeded,
            S::Medium,
            0.9,
        ),
        FailurePattern::regex(
            "Authentication Error",
            r"(?i)unauthorized|authentication failed|invalid api key",
            C::AuthenticationError,
            S::Critical,
            0.95,
        ),
        FailurePattern::regex(
            "Content Filter Violation",
            r"(?i)content filter|inappropriate content|policy violation",
            C::ContentFilterViolation,
            S::Medium,
            0.9,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Built-in patterns in evaluation order.
pub fn registry() -> &'static [FailurePattern] {
    &REGISTRY
}

const REPETITION_UNIQUE_RATIO: f64 = 0.3;
const TOPIC_OVERLAP_RATIO: f64 = 0.2;

/// Case-insensitive whitespace tokenization.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn is_blank(output: &str, _input: &str) -> bool {
    output.trim().is_empty()
}

/// Distinct tokens / total tokens in the output. `None` for empty output.
pub(crate) fn unique_token_ratio(output: &str) -> Option<f64> {
    let tokens = tokenize(output);
    if tokens.is_empty() {
        return None;
    }
    let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    Some(unique.len() as f64 / tokens.len() as f64)
}

/// Share of input tokens that also appear in the output. `None` for
/// empty input.
pub(crate) fn input_overlap_ratio(output: &str, input: &str) -> Option<f64> {
    let input_tokens = tokenize(input);
    if input_tokens.is_empty() {
        return None;
    }
    let output_tokens: HashSet<String> = tokenize(output).into_iter().collect();
    let common = input_tokens
        .iter()
        .filter(|token| output_tokens.contains(*token))
        .count();
    Some(common as f64 / input_tokens.len() as f64)
}

fn is_repetitive(output: &str, _input: &str) -> bool {
    unique_token_ratio(output).is_some_and(|ratio| ratio < REPETITION_UNIQUE_RATIO)
}

fn is_off_topic(output: &str, input: &str) -> bool {
    input_overlap_ratio(output, input).is_some_and(|ratio| ratio < TOPIC_OVERLAP_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(name: &str) -> &'static FailurePattern {
        registry()
            .iter()
            .find(|p| p.name == name)
            .expect("pattern should be registered")
    }

    #[test]
    fn registry_has_every_builtin_pattern_in_order() {
        let names: Vec<_> = registry().iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "Empty Response",
                "Generic Error Message",
                "Repetitive Content",
                "Off-topic Response",
                "Incomplete Response",
                "JSON Parse Error",
                "Timeout Error",
                "Rate Limit Error",
                "Authentication Error",
                "Content Filter Violation",
            ]
        );
        assert!(registry()
            .iter()
            .all(|p| (0.0..=1.0).contains(&p.confidence)));
    }

    #[test]
    fn unique_ratio_matches_hand_computed_values() {
        let ratio = unique_token_ratio("a a a a a a b").unwrap();
        assert!((ratio - 2.0 / 7.0).abs() < 1e-9);
        assert!(find("Repetitive Content").rule.matches("a a a a a a b", ""));

        assert_eq!(unique_token_ratio("a b c d e f g"), Some(1.0));
        assert!(!find("Repetitive Content").rule.matches("a b c d e f g", ""));
    }

    #[test]
    fn repetition_is_case_insensitive() {
        assert!(find("Repetitive Content")
            .rule
            .matches("Spam SPAM spam sPaM spam Spam spam eggs", ""));
    }

    #[test]
    fn ratio_rules_never_fire_on_empty_denominators() {
        assert_eq!(unique_token_ratio("   "), None);
        assert_eq!(input_overlap_ratio("anything", ""), None);
        assert!(!find("Repetitive Content").rule.matches("", "question"));
        assert!(!find("Off-topic Response").rule.matches("answer", "  "));
    }

    #[test]
    fn off_topic_uses_input_token_count_as_denominator() {
        let input = "tell me about dogs";
        let output = "the weather is sunny today";
        assert_eq!(input_overlap_ratio(output, input), Some(0.0));
        assert!(find("Off-topic Response").rule.matches(output, input));

        let on_topic = "Dogs are loyal companions, let me tell you about them";
        assert!(!find("Off-topic Response").rule.matches(on_topic, input));
    }

    #[test]
    fn refusal_phrases_only_match_at_start() {
        let rule = &find("Generic Error Message").rule;
        assert!(rule.matches("I can't help with that", ""));
        assert!(rule.matches("i'm UNABLE TO comply", ""));
        assert!(rule.matches("I don’t know the answer", ""));
        assert!(rule.matches("I'm sorry, but no.", ""));
        assert!(!rule.matches("Well, I can't say", ""));
    }

    #[test]
    fn truncation_markers_fire_incomplete_response() {
        let rule = &find("Incomplete Response").rule;
        assert!(rule.matches("and then the story continued...", ""));
        assert!(rule.matches("output was Truncated here", ""));
        assert!(!rule.matches("... but then it finished properly.", ""));
    }

    #[test]
    fn provider_error_phrases_map_to_categories() {
        let cases = [
            ("Error: request timed out", FailureCategory::Timeout),
            ("429 Too Many Requests", FailureCategory::RateLimitExceeded),
            ("Invalid API key provided", FailureCategory::AuthenticationError),
            ("Malformed JSON in body", FailureCategory::InvalidFormat),
            ("blocked by content filter", FailureCategory::ContentFilterViolation),
        ];

        for (text, category) in cases {
            let fired: Vec<_> = registry()
                .iter()
                .filter(|p| matches!(p.rule, PatternRule::Regex(_)) && p.rule.matches(text, text))
                .map(|p| p.category)
                .collect();
            assert!(fired.contains(&category), "{text:?} should map to {category}");
        }
    }
}
