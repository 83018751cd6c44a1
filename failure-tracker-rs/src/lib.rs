// failure-tracker-rs/src/lib.rs
// Failure detection, recording and alerting for conversational AI exchanges.
//
// Design notes:
// - `FailureTracker` is constructed once by the hosting process and shared
//   by reference (typically `Arc<FailureTracker>`) with request handlers.
//   There is no global instance.
// - Detection is a pure function of the exchange and the built-in pattern
//   registry. Recording is the only mutation and is serialized internally.
// - Telemetry sinks are best-effort: their failures are logged and counted,
//   never returned to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

pub mod alert;
pub mod config;
pub mod detector;
pub mod logging;
pub mod model;
pub mod patterns;
pub mod recorder;
pub mod sink;


pub use crate::alert::{AlertMonitor, AlertSummary};
pub use crate::config::{ConfigError, FailureTrackingConfig, RateBasis};
pub use crate::detector::Detector;
pub use crate::model::{
    AnalyticsEvent, DetectionResult, FailureCategory, FailureDetails, FailureRecord,
    FailureSeverity, FailureStats, Metadata, Signal,
};
pub use crate::recorder::FailureRecorder;
pub use crate::sink::{EventSink, HttpSink, HttpSinkConfig, LoggingSink, SignalSink, SinkError};

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, FailureTrackerError>;

/// Errors visible to callers. Sink failures are deliberately absent.
#[derive(Debug, thiserror::Error)]
pub enum FailureTrackerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A failure reported by a caller, optionally with the exchange that
/// produced it so auto-detection can run over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub event_id: String,
    pub category: FailureCategory,
    #[serde(default)]
    pub severity: Option<FailureSeverity>,
    #[serde(default)]
    pub details: FailureDetails,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "default_auto_detect")]
    pub auto_detect: bool,
}

fn default_auto_detect() -> bool {
    true
}

impl FailureReport {
    pub fn new(event_id: impl Into<String>, category: FailureCategory) -> Self {
        Self {
            event_id: event_id.into(),
            category,
            severity: None,
            details: FailureDetails::default(),
            input: None,
            output: None,
            auto_detect: true,
        }
    }

    pub fn with_exchange(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self.output = Some(output.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub event_id: String,
    pub category: FailureCategory,
    pub severity: FailureSeverity,
    pub auto_detections: usize,
    pub stats: FailureStats,
}

/// Composition root: detector, recorder and alert monitor behind one
/// handle.
///
/// ```ignore
/// let tracker = Arc::new(FailureTracker::new(
///     FailureTrackingConfig::from_env(),
///     Arc::new(HttpSink::new_default()?),
///     Arc::new(LoggingSink),
/// )?);
///
/// let detections = tracker.detect_failures(&input, &output, &Metadata::new());
/// for d in &detections {
///     tracker.track_failure(&event_id, d.category, d.severity, details.clone()).await?;
/// }
/// ```
pub struct FailureTracker {
    config: FailureTrackingConfig,
    detector: Detector,
    recorder: FailureRecorder,
    alerts: AlertMonitor,
    soft_errors: Arc<AtomicU64>,
}

impl FailureTracker {
    /// Validates `config` and wires the components. Fails fast on invalid
    /// thresholds or windows.
    pub fn new(
        config: FailureTrackingConfig,
        signal_sink: Arc<dyn SignalSink>,
        event_sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let soft_errors = Arc::new(AtomicU64::new(0));
        let detector = Detector::new(config.enable_auto_detection, config.confidence_threshold);
        let recorder = FailureRecorder::new(&config, signal_sink, Arc::clone(&soft_errors));
        let alerts = AlertMonitor::new(&config, event_sink, Arc::clone(&soft_errors));

        Ok(Self {
            config,
            detector,
            recorder,
            alerts,
            soft_errors,
        })
    }

    /// Tracker whose sinks only log; for local development.
    pub fn with_logging_sinks(config: FailureTrackingConfig) -> Result<Self> {
        Self::new(config, Arc::new(LoggingSink), Arc::new(LoggingSink))
    }

    pub fn config(&self) -> &FailureTrackingConfig {
        &self.config
    }

    pub fn detect_failures(
        &self,
        input: &str,
        output: &str,
        context: &Metadata,
    ) -> Vec<DetectionResult> {
        self.detector.detect(input, output, context)
    }

    /// Record a failure, forward it to the signal sink and run the alert
    /// check. Only validation problems are returned as errors.
    #[instrument(
        name = "track_failure",
        skip(self, details),
        fields(failure.category = %category, failure.severity = %severity)
    )]
    pub async fn track_failure(
        &self,
        event_id: &str,
        category: FailureCategory,
        severity: FailureSeverity,
        details: FailureDetails,
    ) -> Result<()> {
        self.track_failure_at(event_id, category, severity, details, Utc::now())
            .await
            .map(|_| ())
    }

    pub(crate) async fn track_failure_at(
        &self,
        event_id: &str,
        category: FailureCategory,
        severity: FailureSeverity,
        details: FailureDetails,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertSummary>> {
        validate_failure(event_id, &details)?;

        self.recorder
            .record_at(event_id, category, severity, details, now)
            .await;

        let alert = if self.config.enable_alerting {
            self.alerts.check_and_maybe_alert_at(&self.recorder, now).await
        } else {
            None
        };

        tracing::info!(
            event_id,
            category = %category,
            severity = %severity,
            "failure tracked"
        );

        Ok(alert)
    }

    pub fn get_failure_stats(&self) -> FailureStats {
        self.recorder.stats()
    }

    /// Count one served exchange. Only affects rates when the configured
    /// [`RateBasis`] is `TotalEvents`.
    pub fn note_event(&self) {
        self.recorder.note_event_at(Utc::now());
    }

    /// Lifetime failure counts keyed by category and severity.
    pub fn failure_counts(&self) -> HashMap<(FailureCategory, FailureSeverity), u64> {
        self.recorder.counts()
    }

    /// Newest retained failures first.
    pub fn recent_failures(&self, limit: usize) -> Vec<FailureRecord> {
        self.recorder.recent(limit)
    }

    /// Sink deliveries that failed or timed out since construction.
    pub fn sink_errors(&self) -> u64 {
        self.soft_errors.load(Ordering::Relaxed)
    }

    /// Track a reported failure, then auto-detect over the attached
    /// exchange and track every detection as well.
    #[instrument(
        name = "report_failure",
        skip(self, report),
        fields(event_id = %report.event_id, failure.category = %report.category)
    )]
    pub async fn report(&self, report: FailureReport) -> Result<ReportOutcome> {
        let FailureReport {
            event_id,
            category,
            severity,
            mut details,
            input,
            output,
            auto_detect,
        } = report;

        if event_id.trim().is_empty() {
            return Err(FailureTrackerError::Validation(
                "event_id is required".to_string(),
            ));
        }

        let severity = severity.unwrap_or_default();
        let input = input.unwrap_or_default();
        let output = output.unwrap_or_default();

        details.input_length = Some(input.chars().count());
        details.response_length = Some(output.chars().count());
        details.user_id.get_or_insert_with(|| "unknown".to_string());
        details.session_id.get_or_insert_with(|| "unknown".to_string());
        details.latency_ms.get_or_insert(0);
        details
            .model_version
            .get_or_insert_with(|| self.config.default_model_version.clone());

        self.track_failure(&event_id, category, severity, details.clone())
            .await?;

        let mut auto_detections = 0;
        if auto_detect && !input.is_empty() && !output.is_empty() {
            let mut context = Metadata::new();
            context.insert("event_id".to_string(), Value::String(event_id.clone()));
            context.insert(
                "user_id".to_string(),
                Value::String(details.user_id.clone().unwrap_or_default()),
            );
            context.insert(
                "session_id".to_string(),
                Value::String(details.session_id.clone().unwrap_or_default()),
            );

            let detections = self.detect_failures(&input, &output, &context);
            auto_detections = detections.len();

            for detection in detections {
                metrics::increment_counter!(
                    "failure_tracker_detections_total",
                    "pattern" => detection.pattern_name.clone()
                );

                let detected = FailureDetails {
                    description: Some(format!("Auto-detected: {}", detection.pattern_name)),
                    confidence: Some(detection.confidence),
                    auto_detected: true,
                    metadata: detection.metadata,
                    ..details.clone()
                };
                self.track_failure(&event_id, detection.category, detection.severity, detected)
                    .await?;
            }
        }

        Ok(ReportOutcome {
            event_id,
            category,
            severity,
            auto_detections,
            stats: self.get_failure_stats(),
        })
    }
}

fn validate_failure(event_id: &str, details: &FailureDetails) -> Result<()> {
    if event_id.trim().is_empty() {
        return Err(FailureTrackerError::Validation(
            "event_id is required".to_string(),
        ));
    }
    if let Some(confidence) = details.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(FailureTrackerError::Validation(format!(
                "confidence must be in [0, 1], got {confidence}"
            )));
        }
    }
    Ok(())
}
