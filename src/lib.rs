//! An acknowledge-first webhook relay.
//!
//! Platform callbacks are answered immediately and forwarded to a
//! downstream automation endpoint by a single background worker. When a
//! forward fails or times out, a short message is posted back to the
//! callback's notification sink, if it carried one.
//!
//! ## Guarantees
//! - The acknowledgment never waits on the relay target
//! - Forward attempts happen in exact arrival order, one at a time
//! - Every forward attempt is bounded by a timeout
//! - A failing or panicking task never stops the worker
//! - Bounded memory for the inspection log
//!
//! ## Non-Guarantees
//! - Durability across restarts (the queue lives in memory)
//! - Exactly-once delivery, or any retry at all
//! - Parallel forwarding
//! - Back-pressure: the task queue is unbounded
//! - Authentication of inbound callbacks

mod config;
mod error;
mod ingress;
mod logbuf;
mod notify;
mod queue;
mod relay;
mod server;
mod types;
mod worker;

pub use config::{LogFormat, RelayConfig, ServerConfig};
pub use error::{ConfigError, FailureReason, ForwardOutcome, NotifyError, RelayError};
pub use ingress::{decode_body, notification_sink, DecodedBody, Ingress, IngressReply, URL_VERIFICATION};
pub use logbuf::{LogBuffer, MAX_LOGS};
pub use notify::{dispatch_notification, HttpNotifier, Notifier};
pub use queue::{task_queue, TaskQueue, TaskReceiver};
pub use relay::Relay;
pub use server::{app, AppState, DEFAULT_LOG_COUNT};
pub use types::{LogEntry, LogStatus, Payload, RouteProfile, Task};
pub use worker::{failure_message, forward, worker_loop, WorkerContext};
