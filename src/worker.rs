use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{FailureReason, ForwardOutcome};
use crate::logbuf::LogBuffer;
use crate::notify::{dispatch_notification, Notifier};
use crate::queue::TaskReceiver;
use crate::types::{LogStatus, Task};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Shared, read-only context of the forwarding worker.
pub struct WorkerContext {
    pub config: Arc<RelayConfig>,

    /// Client used for every forward attempt.
    pub client: reqwest::Client,

    /// Where failure messages go.
    pub notifier: Arc<dyn Notifier>,

    /// Log buffer receiving the post-forward status.
    pub logs: Arc<LogBuffer>,
}

/// Main worker loop.
///
/// Exactly one of these runs per relay. It:
/// - Pops tasks strictly in enqueue order
/// - Forwards one task at a time, never overlapping attempts
/// - Survives any failure or panic of a single task
/// - Returns once the queue is closed and drained
pub async fn worker_loop(mut rx: TaskReceiver, ctx: Arc<WorkerContext>) {
    info!("forwarding worker started");

    while let Some(task) = rx.pop().await {
        let log_id = task.log_id;
        let subpath = task.subpath.clone();

        // Run each task on its own tokio task so a panic is contained. It is
        // awaited right away, which keeps processing sequential.
        let handle = tokio::spawn(process_task(task, ctx.clone()));
        if let Err(err) = handle.await {
            metric_inc("relay.worker.panic");
            error!(subpath = %subpath, error = %err, "task processing aborted");
            if let Some(id) = log_id {
                ctx.logs
                    .record_outcome(id, LogStatus::Error, Some(FailureReason::Panicked.to_string()))
                    .await;
            }
        }
    }

    info!("task queue closed, forwarding worker stopped");
}

/// Forward one task, record the result and notify on failure.
async fn process_task(task: Task, ctx: Arc<WorkerContext>) -> ForwardOutcome {
    let started = Instant::now();
    let outcome = forward(&task, &ctx.config, &ctx.client).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &outcome {
        ForwardOutcome::Delivered => {
            metric_inc("relay.forward.success");
            info!(subpath = %task.subpath, elapsed_ms, "forwarded");
            if let Some(id) = task.log_id {
                ctx.logs.record_outcome(id, LogStatus::Success, None).await;
            }
        }
        ForwardOutcome::Failed(reason) => {
            metric_inc("relay.forward.failure");
            if reason.is_timeout() {
                metric_inc("relay.forward.timeout");
            }
            warn!(subpath = %task.subpath, elapsed_ms, error = %reason, "forward failed");
            if let Some(id) = task.log_id {
                ctx.logs
                    .record_outcome(id, LogStatus::Error, Some(reason.to_string()))
                    .await;
            }

            match task.notification_sink.as_deref() {
                Some(sink) => {
                    let message = failure_message(reason, &ctx.config);
                    dispatch_notification(ctx.notifier.as_ref(), sink, &message).await;
                }
                None => debug!(subpath = %task.subpath, "no notification sink, failure only logged"),
            }
        }
    }

    outcome
}

/// POST the task payload as JSON to `{base}/{subpath}` within the forward timeout.
pub async fn forward(task: &Task, config: &RelayConfig, client: &reqwest::Client) -> ForwardOutcome {
    let url = config.target_url(&task.subpath);

    let response = client
        .post(&url)
        .timeout(config.forward_timeout)
        .json(&task.payload)
        .send()
        .await;

    match response {
        Ok(resp) if resp.status().is_success() => ForwardOutcome::Delivered,
        Ok(resp) => ForwardOutcome::Failed(FailureReason::RemoteStatus(resp.status().as_u16())),
        Err(err) if err.is_timeout() => ForwardOutcome::Failed(FailureReason::Timeout),
        Err(err) => ForwardOutcome::Failed(FailureReason::Network(err.to_string())),
    }
}

/// Text posted to the notification sink for a failed forward.
pub fn failure_message(reason: &FailureReason, config: &RelayConfig) -> String {
    match reason {
        FailureReason::Timeout => config.timeout_message.clone(),
        other => format!("⚠️ Could not hand the request to the automation service: {}", other),
    }
}
