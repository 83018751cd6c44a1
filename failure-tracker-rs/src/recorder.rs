// failure-tracker-rs/src/recorder.rs
// In-process failure log with lifetime counters and a rolling window.
//
// Implementation notes:
// - All mutable state sits behind one mutex. The lock is only held for
//   in-memory bookkeeping; the signal payload is built before it is taken
//   and sent after it is released.
// - Records older than the retention horizon are pruned on every append,
//   so memory is bounded by traffic over that horizon.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::config::{FailureTrackingConfig, RateBasis};
use crate::model::{
    describe_window, FailureCategory, FailureDetails, FailureRecord, FailureSeverity,
    FailureStats, Sentiment, Signal, SignalType,
};
use crate::sink::{self, SignalSink};

#[derive(Debug, Default)]
struct RecorderState {
    counts: HashMap<(FailureCategory, FailureSeverity), u64>,
    window: VecDeque<FailureRecord>,
    events: VecDeque<DateTime<Utc>>,
}

/// Category counts over a trailing interval.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub failures: usize,
    pub events: usize,
    pub breakdown: BTreeMap<FailureCategory, usize>,
}

pub struct FailureRecorder {
    state: Mutex<RecorderState>,
    signal_sink: Arc<dyn SignalSink>,
    stats_window: Duration,
    retention: Duration,
    sink_timeout: Duration,
    rate_basis: RateBasis,
    soft_errors: Arc<AtomicU64>,
}

impl FailureRecorder {
    pub fn new(
        config: &FailureTrackingConfig,
        signal_sink: Arc<dyn SignalSink>,
        soft_errors: Arc<AtomicU64>,
    ) -> Self {
        Self {
            state: Mutex::new(RecorderState::default()),
            signal_sink,
            stats_window: config.stats_window,
            retention: config.retention(),
            sink_timeout: config.sink_timeout,
            rate_basis: config.rate_basis,
            soft_errors,
        }
    }

    /// A poisoned lock only means another task panicked mid-update; the
    /// counters are still usable.
    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn record(
        &self,
        event_id: &str,
        category: FailureCategory,
        severity: FailureSeverity,
        details: FailureDetails,
    ) {
        self.record_at(event_id, category, severity, details, Utc::now())
            .await
    }

    pub(crate) async fn record_at(
        &self,
        event_id: &str,
        category: FailureCategory,
        severity: FailureSeverity,
        details: FailureDetails,
        now: DateTime<Utc>,
    ) {
        let signal = build_signal(event_id, category, severity, &details, now);

        {
            let mut state = self.lock();
            *state.counts.entry((category, severity)).or_insert(0) += 1;
            state.window.push_back(FailureRecord {
                event_id: event_id.to_string(),
                category,
                severity,
                details,
                timestamp: now,
            });
            prune(&mut state, cutoff(now, self.retention));
        }

        metrics::increment_counter!(
            "failure_tracker_failures_total",
            "category" => category.as_str(),
            "severity" => severity.as_str()
        );

        sink::deliver(
            "signal",
            self.sink_timeout,
            &self.soft_errors,
            self.signal_sink.send_signal(&signal),
        )
        .await;
    }

    /// Count one served exchange for the total-events rate basis.
    pub(crate) fn note_event_at(&self, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.events.push_back(now);
        prune(&mut state, cutoff(now, self.retention));
    }

    /// Counts over `(now - window, now]`.
    pub(crate) fn snapshot_at(&self, window: Duration, now: DateTime<Utc>) -> WindowSnapshot {
        let since = cutoff(now, window);
        let state = self.lock();

        let mut breakdown = BTreeMap::new();
        let mut failures = 0;
        for record in state.window.iter().filter(|r| r.timestamp > since) {
            *breakdown.entry(record.category).or_insert(0) += 1;
            failures += 1;
        }
        let events = state.events.iter().filter(|t| **t > since).count();

        WindowSnapshot {
            failures,
            events,
            breakdown,
        }
    }

    pub fn stats(&self) -> FailureStats {
        self.stats_at(Utc::now())
    }

    pub(crate) fn stats_at(&self, now: DateTime<Utc>) -> FailureStats {
        let snapshot = self.snapshot_at(self.stats_window, now);

        let failure_rate = match self.rate_basis {
            RateBasis::FailuresInWindow => 0.0,
            RateBasis::TotalEvents if snapshot.events > 0 => {
                snapshot.failures as f64 / snapshot.events as f64 * 100.0
            }
            RateBasis::TotalEvents => 0.0,
        };

        FailureStats {
            total_failures: snapshot.failures,
            failure_rate,
            category_breakdown: snapshot.breakdown,
            recent_failures: snapshot.failures,
            time_window: describe_window(self.stats_window),
        }
    }

    /// Lifetime counts keyed by category and severity.
    pub fn counts(&self) -> HashMap<(FailureCategory, FailureSeverity), u64> {
        self.lock().counts.clone()
    }

    /// Newest retained records first.
    pub fn recent(&self, limit: usize) -> Vec<FailureRecord> {
        self.lock().window.iter().rev().take(limit).cloned().collect()
    }
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn prune(state: &mut RecorderState, cutoff: DateTime<Utc>) {
    while state.window.front().is_some_and(|r| r.timestamp <= cutoff) {
        state.window.pop_front();
    }
    while state.events.front().is_some_and(|t| *t <= cutoff) {
        state.events.pop_front();
    }
}

fn build_signal(
    event_id: &str,
    category: FailureCategory,
    severity: FailureSeverity,
    details: &FailureDetails,
    now: DateTime<Utc>,
) -> Signal {
    let mut properties = match json!({
        "failure_category": category.as_str(),
        "failure_severity": severity.as_str(),
        "confidence_score": details.confidence.unwrap_or(0.8),
        "error_type": details.error_type.as_deref().unwrap_or("unknown"),
        "error_message": details.error_message.as_deref().unwrap_or(""),
        "latency_ms": details.latency_ms.unwrap_or(0),
        "model_version": details.model_version.as_deref().unwrap_or("unknown"),
        "user_id": details.user_id.as_deref().unwrap_or("unknown"),
        "session_id": details.session_id.as_deref().unwrap_or("unknown"),
        "input_length": details.input_length.unwrap_or(0),
        "response_length": details.response_length.unwrap_or(0),
        "timestamp": now.to_rfc3339(),
        "auto_detected": details.auto_detected,
        "retry_count": details.retry_count,
    }) {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in &details.metadata {
        properties.insert(key.clone(), value.clone());
    }

    Signal {
        event_id: event_id.to_string(),
        name: format!("failure_{category}"),
        signal_type: SignalType::Feedback,
        comment: details
            .description
            .clone()
            .unwrap_or_else(|| format!("AI failure detected: {category}")),
        sentiment: Sentiment::Negative,
        properties,
    }
}
