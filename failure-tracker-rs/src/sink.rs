// failure-tracker-rs/src/sink.rs
// Telemetry sinks consumed by the recorder and the alert monitor.
//
// Delivery is best-effort: every call goes through `deliver`, which bounds
// it with a timeout and turns any failure into a logged warning plus a
// soft-error count. Nothing here ever fails the caller's request.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::model::{AnalyticsEvent, Signal};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("http error: {0}")]
    Http(String),

    #[error("sink endpoint returned status {0}")]
    Status(u16),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Appends one feedback-shaped signal to the observability backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send_signal(&self, signal: &Signal) -> Result<(), SinkError>;
}

/// Appends one structured analytic event to the observability backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), SinkError>;
}

/// Sink that only emits tracing events. Useful for local development and
/// as the fallback when no backend is configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingSink;

#[async_trait]
impl SignalSink for LoggingSink {
    async fn send_signal(&self, signal: &Signal) -> Result<(), SinkError> {
        tracing::info!(
            signal.event_id = %signal.event_id,
            signal.name = %signal.name,
            signal.comment = %signal.comment,
            properties = %serde_json::Value::Object(signal.properties.clone()),
            "failure signal (logging sink)"
        );
        Ok(())
    }
}

#[async_trait]
impl EventSink for LoggingSink {
    async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        tracing::info!(
            event.event_id = %event.event_id,
            event.name = %event.event,
            event.output = %event.output,
            properties = %serde_json::Value::Object(event.properties.clone()),
            "analytics event (logging sink)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub signals_endpoint: String,
    pub events_endpoint: String,
    pub write_key: Option<String>,
    pub request_timeout: Duration,
}

impl HttpSinkConfig {
    /// Read endpoints from `TRACKING_SIGNALS_ENDPOINT`,
    /// `TRACKING_EVENTS_ENDPOINT` and `TRACKING_WRITE_KEY`.
    pub fn from_env() -> Self {
        let signals_endpoint = std::env::var("TRACKING_SIGNALS_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:8787/v1/signals/track".to_string());
        let events_endpoint = std::env::var("TRACKING_EVENTS_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:8787/v1/events/track".to_string());
        let write_key = std::env::var("TRACKING_WRITE_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Self {
            signals_endpoint,
            events_endpoint,
            write_key,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Sink that POSTs JSON payloads to an HTTP tracking backend.
pub struct HttpSink {
    config: HttpSinkConfig,
    http_client: reqwest::Client,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> Result<Self, SinkError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SinkError::Http(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn new_default() -> Result<Self, SinkError> {
        Self::new(HttpSinkConfig::from_env())
    }

    async fn post<T: Serialize + Sync>(&self, endpoint: &str, body: &T) -> Result<(), SinkError> {
        let mut request = self.http_client.post(endpoint).json(body);
        if let Some(key) = &self.config.write_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}

#[async_trait]
impl SignalSink for HttpSink {
    async fn send_signal(&self, signal: &Signal) -> Result<(), SinkError> {
        self.post(&self.config.signals_endpoint, signal).await
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        self.post(&self.config.events_endpoint, event).await
    }
}

/// Await a sink call with a deadline. Returns whether it succeeded;
/// failures and timeouts are logged and counted in `soft_errors`.
pub(crate) async fn deliver<F>(
    sink: &'static str,
    timeout: Duration,
    soft_errors: &AtomicU64,
    call: F,
) -> bool
where
    F: Future<Output = Result<(), SinkError>>,
{
    let failure = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(())) => return true,
        Ok(Err(err)) => err.to_string(),
        Err(_) => format!("timed out after {} ms", timeout.as_millis()),
    };

    soft_errors.fetch_add(1, Ordering::Relaxed);
    metrics::increment_counter!("failure_tracker_sink_errors_total", "sink" => sink);
    tracing::warn!(sink, error = %failure, "telemetry delivery failed; continuing");
    false
}
