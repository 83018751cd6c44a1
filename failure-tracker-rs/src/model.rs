// failure-tracker-rs/src/model.rs
// Shared data types for detection, recording and alerting.
//
// Categories and severities are closed enums so that a typo at a call site
// is a compile error (or a validation error at a string boundary) rather
// than a new bucket in the stored history.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FailureTrackerError;

/// Free-form key/value metadata attached to detections, signals and events.
pub type Metadata = serde_json::Map<String, Value>;

/// Kind of failure observed in a conversational exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    LogicError,
    #[serde(alias = "time_out")]
    Timeout,
    IrrelevantResponse,
    #[serde(alias = "output_schema_mismatch")]
    SchemaMismatch,
    #[serde(alias = "missing_required_field")]
    MissingField,
    InvalidFormat,
    Hallucination,
    #[serde(alias = "bias_detected")]
    Bias,
    ContextLoss,
    TokenLimitExceeded,
    RateLimitExceeded,
    ApiError,
    NetworkError,
    AuthenticationError,
    ContentFilterViolation,
    #[serde(alias = "unknown_error")]
    Unknown,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 16] = [
        FailureCategory::LogicError,
        FailureCategory::Timeout,
        FailureCategory::IrrelevantResponse,
        FailureCategory::SchemaMismatch,
        FailureCategory::MissingField,
        FailureCategory::InvalidFormat,
        FailureCategory::Hallucination,
        FailureCategory::Bias,
        FailureCategory::ContextLoss,
        FailureCategory::TokenLimitExceeded,
        FailureCategory::RateLimitExceeded,
        FailureCategory::ApiError,
        FailureCategory::NetworkError,
        FailureCategory::AuthenticationError,
        FailureCategory::ContentFilterViolation,
        FailureCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::LogicError => "logic_error",
            FailureCategory::Timeout => "timeout",
            FailureCategory::IrrelevantResponse => "irrelevant_response",
            FailureCategory::SchemaMismatch => "schema_mismatch",
            FailureCategory::MissingField => "missing_field",
            FailureCategory::InvalidFormat => "invalid_format",
            FailureCategory::Hallucination => "hallucination",
            FailureCategory::Bias => "bias",
            FailureCategory::ContextLoss => "context_loss",
            FailureCategory::TokenLimitExceeded => "token_limit_exceeded",
            FailureCategory::RateLimitExceeded => "rate_limit_exceeded",
            FailureCategory::ApiError => "api_error",
            FailureCategory::NetworkError => "network_error",
            FailureCategory::AuthenticationError => "authentication_error",
            FailureCategory::ContentFilterViolation => "content_filter_violation",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCategory {
    type Err = FailureTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let legacy = match normalized.as_str() {
            "time_out" => Some(FailureCategory::Timeout),
            "output_schema_mismatch" => Some(FailureCategory::SchemaMismatch),
            "missing_required_field" => Some(FailureCategory::MissingField),
            "bias_detected" => Some(FailureCategory::Bias),
            "unknown_error" => Some(FailureCategory::Unknown),
            _ => None,
        };
        if let Some(category) = legacy {
            return Ok(category);
        }

        FailureCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| FailureTrackerError::Validation(format!("unknown failure category: {s}")))
    }
}

/// Ordered severity of a failure. Only identity comparison is meaningful
/// to the tracker itself; the ordering exists for callers that filter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl FailureSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureSeverity::Low => "low",
            FailureSeverity::Medium => "medium",
            FailureSeverity::High => "high",
            FailureSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for FailureSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureSeverity {
    type Err = FailureTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(FailureSeverity::Low),
            "medium" => Ok(FailureSeverity::Medium),
            "high" => Ok(FailureSeverity::High),
            "critical" => Ok(FailureSeverity::Critical),
            _ => Err(FailureTrackerError::Validation(format!(
                "unknown failure severity: {s}"
            ))),
        }
    }
}

/// Output of one pattern firing against one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub pattern_name: String,
    pub category: FailureCategory,
    pub severity: FailureSeverity,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub truncated_input: String,
    pub truncated_output: String,
    pub metadata: Metadata,
}

/// Contextual details supplied alongside a tracked failure.
///
/// Every field is optional; missing values are replaced with neutral
/// defaults (`"unknown"`, `0`, `false`) when the signal payload is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub description: Option<String>,
    pub confidence: Option<f64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: Option<u64>,
    pub model_version: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input_length: Option<usize>,
    pub response_length: Option<usize>,
    #[serde(default)]
    pub auto_detected: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One tracked failure occurrence. Append-only; expired by age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub event_id: String,
    pub category: FailureCategory,
    pub severity: FailureSeverity,
    pub details: FailureDetails,
    pub timestamp: DateTime<Utc>,
}

/// Read-only snapshot over the stats window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureStats {
    pub total_failures: usize,
    pub failure_rate: f64,
    pub category_breakdown: BTreeMap<FailureCategory, usize>,
    pub recent_failures: usize,
    pub time_window: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Feedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Negative,
}

/// Human-readable feedback-shaped record delivered to a [`crate::SignalSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub event_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub comment: String,
    pub sentiment: Sentiment,
    pub properties: Metadata,
}

/// Structured analytic record delivered to an [`crate::EventSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: String,
    pub event: String,
    pub user_id: String,
    pub model: String,
    pub input: String,
    pub output: String,
    pub properties: Metadata,
}

/// Human-readable description of a window length ("1 hour", "5 minutes").
pub(crate) fn describe_window(window: std::time::Duration) -> String {
    let secs = window.as_secs();
    if secs % 3600 == 0 && secs > 0 {
        let hours = secs / 3600;
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{hours} hours")
        }
    } else if secs % 60 == 0 && secs > 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    } else {
        format!("{secs} seconds")
    }
}
