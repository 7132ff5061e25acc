#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    Router,
};
use serde_json::Value;
use tokio::sync::Mutex;

use webhook_relay::{Notifier, NotifyError};

/// Requests seen by a test server, in arrival order.
#[derive(Clone, Default)]
pub struct Recorder {
    hits: Arc<Mutex<Vec<(String, Value)>>>,
    authorizations: Arc<Mutex<Vec<Option<String>>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Recorder {
    pub async fn hits(&self) -> Vec<(String, Value)> {
        self.hits.lock().await.clone()
    }

    /// `Authorization` header of each request, `None` when absent.
    pub async fn authorizations(&self) -> Vec<Option<String>> {
        self.authorizations.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.hits.lock().await.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` requests arrived or `within` elapsed.
    pub async fn wait_for(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.len().await >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.len().await >= count
    }
}

#[derive(Clone)]
struct ServerState {
    recorder: Recorder,
    delay: Duration,
    status: StatusCode,
}

async fn record(State(state): State<ServerState>, uri: Uri, headers: HeaderMap, body: Bytes) -> StatusCode {
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    state.recorder.authorizations.lock().await.push(authorization);
    state.recorder.hits.lock().await.push((uri.path().to_string(), body));

    let now = state.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.recorder.max_in_flight.fetch_max(now, Ordering::SeqCst);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);

    state.status
}

/// Spawn an HTTP server accepting any POST. Returns its base URL.
pub async fn spawn_server(delay: Duration, status: StatusCode) -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new().fallback(record).with_state(ServerState {
        recorder: recorder.clone(),
        delay,
        status,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), recorder)
}

/// Notifier keeping every message in memory.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, sink_url: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((sink_url.to_string(), message.to_string()));
        Ok(())
    }
}

/// Notifier that panics on use.
pub struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn notify(&self, _sink_url: &str, _message: &str) -> Result<(), NotifyError> {
        panic!("notifier exploded");
    }
}
