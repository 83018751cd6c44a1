// failure-tracker-rs/src/alert.rs
// High-failure-rate alerting over the recorder's alert window.
//
// Every qualifying check emits an alert; there is no cooldown or
// de-duplication, so a burst of failures produces a burst of alerts.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{FailureTrackingConfig, RateBasis};
use crate::model::{AnalyticsEvent, FailureCategory};
use crate::recorder::{FailureRecorder, WindowSnapshot};
use crate::sink::{self, EventSink};

/// Summary of an alert that was raised (delivery is best-effort).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub event_id: String,
    pub failure_rate: f64,
    pub threshold: f64,
    pub total_failures: usize,
    pub failure_breakdown: BTreeMap<FailureCategory, usize>,
    pub delivered: bool,
}

pub struct AlertMonitor {
    event_sink: Arc<dyn EventSink>,
    threshold: f64,
    window: Duration,
    rate_basis: RateBasis,
    sink_timeout: Duration,
    soft_errors: Arc<AtomicU64>,
}

impl AlertMonitor {
    pub fn new(
        config: &FailureTrackingConfig,
        event_sink: Arc<dyn EventSink>,
        soft_errors: Arc<AtomicU64>,
    ) -> Self {
        Self {
            event_sink,
            threshold: config.alert_failure_rate,
            window: config.alert_window,
            rate_basis: config.rate_basis,
            sink_timeout: config.sink_timeout,
            soft_errors,
        }
    }

    /// In-window failure rate in percent.
    ///
    /// With [`RateBasis::FailuresInWindow`] the in-window failure count is
    /// its own denominator, so any failure gives 100.
    pub fn failure_rate(&self, snapshot: &WindowSnapshot) -> f64 {
        let denominator = match self.rate_basis {
            RateBasis::FailuresInWindow => snapshot.failures,
            RateBasis::TotalEvents => snapshot.events,
        };
        if denominator == 0 {
            return 0.0;
        }
        snapshot.failures as f64 / denominator as f64 * 100.0
    }

    pub async fn check_and_maybe_alert(&self, recorder: &FailureRecorder) -> Option<AlertSummary> {
        self.check_and_maybe_alert_at(recorder, Utc::now()).await
    }

    pub(crate) async fn check_and_maybe_alert_at(
        &self,
        recorder: &FailureRecorder,
        now: DateTime<Utc>,
    ) -> Option<AlertSummary> {
        let snapshot = recorder.snapshot_at(self.window, now);
        let failure_rate = self.failure_rate(&snapshot);

        if failure_rate <= self.threshold {
            return None;
        }

        let event = self.build_alert(&snapshot, failure_rate, now);
        let event_id = event.event_id.clone();

        metrics::increment_counter!("failure_tracker_alerts_total");
        tracing::warn!(
            alert.event_id = %event_id,
            failure_rate,
            threshold = self.threshold,
            total_failures = snapshot.failures,
            "ALERT: high failure rate detected"
        );

        let delivered = sink::deliver(
            "event",
            self.sink_timeout,
            &self.soft_errors,
            self.event_sink.send_event(&event),
        )
        .await;

        Some(AlertSummary {
            event_id,
            failure_rate,
            threshold: self.threshold,
            total_failures: snapshot.failures,
            failure_breakdown: snapshot.breakdown,
            delivered,
        })
    }

    fn build_alert(
        &self,
        snapshot: &WindowSnapshot,
        failure_rate: f64,
        now: DateTime<Utc>,
    ) -> AnalyticsEvent {
        let breakdown: serde_json::Map<String, Value> = snapshot
            .breakdown
            .iter()
            .map(|(category, count)| (category.to_string(), json!(count)))
            .collect();

        let properties = match json!({
            "alert_type": "high_failure_rate",
            "failure_rate": failure_rate,
            "threshold": self.threshold,
            "time_window_minutes": self.window.as_secs_f64() / 60.0,
            "failure_breakdown": breakdown,
            "total_failures": snapshot.failures,
            "timestamp": now.to_rfc3339(),
            "severity": "high",
            "requires_attention": true,
        }) {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        AnalyticsEvent {
            event_id: format!("alert_{}", Uuid::new_v4()),
            event: "failure_alert".to_string(),
            user_id: "system".to_string(),
            model: "alerting_system".to_string(),
            input: "High failure rate detected".to_string(),
            output: format!(
                "Failure rate {failure_rate:.2}% exceeds threshold of {}%",
                self.threshold
            ),
            properties,
        }
    }
}
