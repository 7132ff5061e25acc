use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RelayConfig;
use crate::ingress::Ingress;
use crate::logbuf::LogBuffer;
use crate::notify::{HttpNotifier, Notifier};
use crate::queue::{task_queue, TaskQueue};
use crate::worker::{worker_loop, WorkerContext};

/// Owner of the relay state: task queue, log buffer and the forwarding worker.
///
/// Everything the HTTP handlers and the worker share is created here and
/// handed out explicitly; there is no global state.
pub struct Relay {
    config: Arc<RelayConfig>,
    queue: Arc<TaskQueue>,
    logs: Arc<LogBuffer>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Relay {
    /// Start a relay that notifies over HTTP. Must be called inside a tokio runtime.
    pub fn start(config: RelayConfig) -> Self {
        let notifier = HttpNotifier::new(reqwest::Client::new(), config.notify_timeout);
        Self::start_with_notifier(config, Arc::new(notifier))
    }

    /// Start a relay with a custom notifier.
    pub fn start_with_notifier(config: RelayConfig, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config);
        let logs = Arc::new(LogBuffer::new(config.max_logs));
        let (queue, rx) = task_queue();

        let ctx = Arc::new(WorkerContext {
            config: config.clone(),
            client: reqwest::Client::new(),
            notifier,
            logs: logs.clone(),
        });
        let worker_handle = tokio::spawn(worker_loop(rx, ctx));

        info!(
            base_url = %config.base_url,
            routes = config.routes.len(),
            forward_timeout_ms = config.forward_timeout.as_millis() as u64,
            max_logs = config.max_logs,
            has_platform_token = config.platform_token.is_some(),
            "relay started"
        );

        Self {
            config,
            queue: Arc::new(queue),
            logs,
            worker_handle: Some(worker_handle),
        }
    }

    /// A handle for inbound request handlers.
    pub fn ingress(&self) -> Ingress {
        Ingress::new(self.config.clone(), self.queue.clone(), self.logs.clone())
    }

    pub fn config(&self) -> &Arc<RelayConfig> {
        &self.config
    }

    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Drain and stop.
    ///
    /// New tasks are refused from here on; every task already queued is still
    /// forwarded before the worker exits and this call returns.
    pub async fn shutdown(&mut self) {
        self.queue.close();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.await;
        }
        info!("relay stopped");
    }
}
