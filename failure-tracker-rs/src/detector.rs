// failure-tracker-rs/src/detector.rs
// Applies the pattern registry to one input/output exchange.

use chrono::Utc;
use serde_json::Value;

use crate::model::{DetectionResult, Metadata};
use crate::patterns::{self, FailurePattern};

/// Inputs and outputs are capped to this many characters before they are
/// copied into a [`DetectionResult`].
pub const TRUNCATE_CHARS: usize = 200;

/// Pure evaluator over a fixed pattern set. Holds no mutable state, so a
/// shared reference can be used from any number of tasks.
#[derive(Debug, Clone)]
pub struct Detector {
    patterns: &'static [FailurePattern],
    enabled: bool,
    confidence_threshold: f64,
}

impl Detector {
    pub fn new(enabled: bool, confidence_threshold: f64) -> Self {
        Self {
            patterns: patterns::registry(),
            enabled,
            confidence_threshold,
        }
    }

    /// Run every pattern against `(output, input)`.
    ///
    /// One result per firing pattern, in registry order. Empty when
    /// detection is disabled or nothing fires; never an error.
    pub fn detect(&self, input: &str, output: &str, context: &Metadata) -> Vec<DetectionResult> {
        if !self.enabled {
            return Vec::new();
        }

        self.patterns
            .iter()
            .filter(|pattern| pattern.confidence >= self.confidence_threshold)
            .filter(|pattern| pattern.rule.matches(output, input))
            .map(|pattern| {
                let mut metadata = context.clone();
                metadata.insert(
                    "pattern_matched".to_string(),
                    Value::String(pattern.name.to_string()),
                );
                metadata.insert("auto_detected".to_string(), Value::Bool(true));

                DetectionResult {
                    pattern_name: pattern.name.to_string(),
                    category: pattern.category,
                    severity: pattern.severity,
                    confidence: pattern.confidence,
                    detected_at: Utc::now(),
                    truncated_input: truncate(input),
                    truncated_output: truncate(output),
                    metadata,
                }
            })
            .collect()
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(TRUNCATE_CHARS).collect()
}
