use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::NotifyError;

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Posts human-readable follow-up messages back to an event's origin.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, sink_url: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier posting `{"text": message}` as JSON to the sink URL.
///
/// Sink URLs come from unauthenticated inbound payloads, so requests carry
/// no credentials of any kind.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNotifier {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, sink_url: &str, message: &str) -> Result<(), NotifyError> {
        let request = self
            .client
            .post(sink_url)
            .timeout(self.timeout)
            .json(&json!({ "text": message }));

        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(NotifyError::RemoteStatus(resp.status().as_u16())),
            Err(err) if err.is_timeout() => Err(NotifyError::Timeout),
            Err(err) => Err(NotifyError::Network(err.to_string())),
        }
    }
}

/// Best-effort delivery of one notification.
///
/// Failures are logged and swallowed. Nothing is retried or queued: this
/// already is the failure path of a forward.
pub async fn dispatch_notification(notifier: &dyn Notifier, sink_url: &str, message: &str) {
    match notifier.notify(sink_url, message).await {
        Ok(()) => debug!(sink = sink_url, "notification delivered"),
        Err(err) => {
            metric_inc("relay.notify.failure");
            warn!(sink = sink_url, error = %err, "notification failed");
        }
    }
}
