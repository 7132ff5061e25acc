use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::logbuf::LogBuffer;
use crate::queue::TaskQueue;
use crate::types::{LogEntry, Payload, Task};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// `type` value of the platform's endpoint ownership handshake.
pub const URL_VERIFICATION: &str = "url_verification";

/// Inbound body after content sniffing.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    /// Valid JSON, any shape.
    Json(Value),

    /// `application/x-www-form-urlencoded` fields, in arrival order.
    Form(Payload),

    /// No bytes at all.
    Empty,

    /// Neither valid JSON nor form-encoded.
    Malformed,
}

impl DecodedBody {
    /// The opaque mapping forwarded to the relay target.
    ///
    /// Anything that is not a JSON object or a form yields an empty payload.
    pub fn payload(&self) -> Payload {
        match self {
            DecodedBody::Json(Value::Object(map)) => map.clone(),
            DecodedBody::Form(fields) => fields.clone(),
            _ => Payload::new(),
        }
    }

    /// The echo token when this body is a verification handshake.
    pub fn challenge(&self) -> Option<String> {
        let DecodedBody::Json(Value::Object(map)) = self else {
            return None;
        };
        if map.get("type").and_then(Value::as_str) != Some(URL_VERIFICATION) {
            return None;
        }
        let token = match map.get("challenge") {
            Some(Value::String(token)) => token.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Some(token)
    }
}

/// Decode an inbound body without trusting the declared content type.
///
/// JSON is tried first, then form encoding. Anything else, plain text and
/// binary included, is malformed.
pub fn decode_body(body: &[u8]) -> DecodedBody {
    let start = body.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(body.len());
    let end = body.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    let trimmed = &body[start..end];
    if trimmed.is_empty() {
        return DecodedBody::Empty;
    }

    match serde_json::from_slice::<Value>(trimmed) {
        Ok(value) => DecodedBody::Json(value),
        Err(_) if looks_form_encoded(trimmed) => {
            let fields = url::form_urlencoded::parse(trimmed)
                .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
                .collect();
            DecodedBody::Form(fields)
        }
        Err(_) => DecodedBody::Malformed,
    }
}

/// Valid UTF-8 without raw whitespace or control bytes, where every `&`
/// separated pair either has a `=` or is a bare key of unreserved characters.
fn looks_form_encoded(body: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    if text.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    text.split('&').filter(|pair| !pair.is_empty()).all(|pair| {
        pair.contains('=')
            || pair
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%' | '+' | '*'))
    })
}

/// Extract the notification sink from `field`, accepting only http(s) URLs.
pub fn notification_sink(payload: &Payload, field: &str) -> Option<String> {
    let raw = payload.get(field)?.as_str()?.trim();
    let parsed = url::Url::parse(raw).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| raw.to_string())
}

/// Synchronous answer returned to the inbound caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressReply {
    /// Echo of a verification token, sent back as plain text.
    Challenge(String),

    /// Fixed acknowledgment text, sent back as `{"text": ...}`.
    Ack(String),
}

/// Turns inbound callbacks into queued tasks and acknowledges them at once.
///
/// The acknowledgment never waits on the relay target: `handle` only
/// appends a log entry and pushes onto the in-process queue.
#[derive(Debug, Clone)]
pub struct Ingress {
    config: Arc<RelayConfig>,
    queue: Arc<TaskQueue>,
    logs: Arc<LogBuffer>,
}

impl Ingress {
    pub fn new(config: Arc<RelayConfig>, queue: Arc<TaskQueue>, logs: Arc<LogBuffer>) -> Self {
        Self { config, queue, logs }
    }

    pub fn config(&self) -> &Arc<RelayConfig> {
        &self.config
    }

    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    /// Handle one inbound callback.
    ///
    /// `path` is the original request path, `/` included. The status is
    /// always 200: forwarding problems surface through notifications and the
    /// log buffer, never through this reply.
    pub async fn handle(&self, path: &str, headers: &HeaderMap, body: &[u8]) -> (IngressReply, StatusCode) {
        let decoded = decode_body(body);

        // The handshake looks like an ordinary event, so check it first.
        if let Some(token) = decoded.challenge() {
            metric_inc("relay.ingress.challenge");
            info!(path, "answered url verification challenge");
            return (IngressReply::Challenge(token), StatusCode::OK);
        }

        let subpath = path.trim_start_matches('/').to_string();
        let payload = decoded.payload();

        let mut entry = LogEntry::new(path, header_snapshot(headers));
        match &decoded {
            DecodedBody::Json(value) => entry = entry.with_json(value.clone()),
            DecodedBody::Form(fields) => entry = entry.with_form(fields.clone()),
            DecodedBody::Malformed => {
                warn!(path, bytes = body.len(), "malformed body, forwarding empty payload");
            }
            DecodedBody::Empty => {}
        }
        let log_id = self.logs.append(entry).await;

        let sink = notification_sink(&payload, self.config.sink_field_for(&subpath));
        let mut task = Task::new(subpath, payload).with_log_id(log_id);
        if let Some(sink) = sink {
            task = task.with_notification_sink(sink);
        }

        debug!(
            subpath = %task.subpath,
            log_id,
            has_sink = task.notification_sink.is_some(),
            "enqueueing task"
        );
        match self.queue.push(task) {
            Ok(()) => metric_inc("relay.ingress.accepted"),
            Err(err) => warn!(path, log_id, error = %err, "task dropped"),
        }

        (IngressReply::Ack(self.config.ack_text.clone()), StatusCode::OK)
    }
}

fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        snapshot
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::queue::{task_queue, TaskReceiver};

    fn ingress(config: RelayConfig) -> (Ingress, TaskReceiver) {
        let (queue, rx) = task_queue();
        let logs = Arc::new(LogBuffer::new(config.max_logs));
        (Ingress::new(Arc::new(config), Arc::new(queue), logs), rx)
    }

    #[test]
    fn decodes_json_and_form() {
        let json = decode_body(br#"{"b": 1, "a": "x"}"#);
        let keys: Vec<String> = json.payload().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);

        let form = decode_body(b"command=%2Fdeploy&text=now+please&response_url=https%3A%2F%2Fhooks.example.com%2Fr");
        let payload = form.payload();
        assert_eq!(payload["command"], json!("/deploy"));
        assert_eq!(payload["text"], json!("now please"));
        assert_eq!(payload["response_url"], json!("https://hooks.example.com/r"));
    }

    #[test]
    fn tolerates_malformed_and_empty_bodies() {
        assert_eq!(decode_body(b"{not json"), DecodedBody::Malformed);
        assert_eq!(decode_body(b"   "), DecodedBody::Empty);
        assert!(decode_body(b"{not json").payload().is_empty());
        assert!(decode_body(b"[1, 2]").payload().is_empty());
    }

    #[test]
    fn plain_text_and_binary_are_malformed() {
        let text = decode_body(b"hello world, not a form");
        assert_eq!(text, DecodedBody::Malformed);
        assert!(text.payload().is_empty());

        let binary = decode_body(&[0xff, 0xfe, 0x00, 0x41]);
        assert_eq!(binary, DecodedBody::Malformed);
        assert!(binary.payload().is_empty());

        assert_eq!(decode_body(b"a=1&{oops}"), DecodedBody::Malformed);
    }

    #[test]
    fn bare_form_keys_are_accepted() {
        let body = decode_body(b"flag&text=hi%20there");
        let payload = body.payload();
        assert_eq!(payload["flag"], json!(""));
        assert_eq!(payload["text"], json!("hi there"));
    }

    #[tokio::test]
    async fn plain_text_body_enqueues_empty_payload() {
        let (ingress, mut rx) = ingress(RelayConfig::default());

        ingress.handle("/hook", &HeaderMap::new(), b"just some words").await;

        assert!(rx.pop().await.unwrap().payload.is_empty());
        let logged = ingress.logs().recent(1).await;
        assert!(logged[0].form.is_none());
        assert!(logged[0].json.is_none());
    }

    #[test]
    fn challenge_requires_url_verification_type() {
        let body = decode_body(br#"{"type": "url_verification", "challenge": "abc123"}"#);
        assert_eq!(body.challenge().as_deref(), Some("abc123"));

        let event = decode_body(br#"{"type": "event_callback", "challenge": "abc123"}"#);
        assert_eq!(event.challenge(), None);

        let form = decode_body(b"type=url_verification&challenge=abc123");
        assert_eq!(form.challenge(), None);
    }

    #[test]
    fn sink_must_be_http_url() {
        let mut payload = Payload::new();
        payload.insert("response_url".into(), json!("https://hooks.example.com/x"));
        payload.insert("bad".into(), json!("not a url"));
        payload.insert("ftp".into(), json!("ftp://example.com/x"));
        payload.insert("number".into(), json!(42));

        assert_eq!(notification_sink(&payload, "response_url").as_deref(), Some("https://hooks.example.com/x"));
        assert_eq!(notification_sink(&payload, "bad"), None);
        assert_eq!(notification_sink(&payload, "ftp"), None);
        assert_eq!(notification_sink(&payload, "number"), None);
        assert_eq!(notification_sink(&payload, "missing"), None);
    }

    #[tokio::test]
    async fn challenge_bypasses_queue_and_log() {
        let (ingress, mut rx) = ingress(RelayConfig::default());
        let body = br#"{"type": "url_verification", "challenge": "abc123"}"#;

        let (reply, status) = ingress.handle("/slack/events", &HeaderMap::new(), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply, IngressReply::Challenge("abc123".into()));
        assert!(ingress.logs().is_empty().await);
        ingress.queue.close();
        assert!(rx.pop().await.is_none());
    }

    #[tokio::test]
    async fn event_is_logged_enqueued_and_acked() {
        let (ingress, mut rx) = ingress(RelayConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/x-www-form-urlencoded"));

        let (reply, status) = ingress
            .handle("/webhook/abc", &headers, b"text=hi&response_url=https%3A%2F%2Fsink.example.com%2F1")
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply, IngressReply::Ack("processing, please wait".into()));

        let task = rx.pop().await.unwrap();
        assert_eq!(task.subpath, "webhook/abc");
        assert_eq!(task.payload["text"], json!("hi"));
        assert_eq!(task.notification_sink.as_deref(), Some("https://sink.example.com/1"));

        let logged = ingress.logs().recent(10).await;
        assert_eq!(logged.len(), 1);
        assert_eq!(Some(logged[0].id), task.log_id);
        assert_eq!(logged[0].path, "/webhook/abc");
        assert_eq!(logged[0].headers["content-type"], "application/x-www-form-urlencoded");
        assert!(logged[0].form.is_some());
    }

    #[tokio::test]
    async fn malformed_body_still_enqueues_empty_payload() {
        let (ingress, mut rx) = ingress(RelayConfig::default());

        let (reply, status) = ingress.handle("/hook", &HeaderMap::new(), b"{\"broken\": ").await;

        assert_eq!(status, StatusCode::OK);
        assert!(matches!(reply, IngressReply::Ack(_)));
        let task = rx.pop().await.unwrap();
        assert!(task.payload.is_empty());
        assert!(task.notification_sink.is_none());
        assert_eq!(ingress.logs().len().await, 1);
    }

    #[tokio::test]
    async fn route_profile_changes_sink_field() {
        let config = RelayConfig::default()
            .with_route(crate::types::RouteProfile::new("teams").with_sink_field("callback_url"));
        let (ingress, mut rx) = ingress(config);
        let body = br#"{"callback_url": "http://teams.example.com/cb", "response_url": "http://ignored.example.com"}"#;

        ingress.handle("/teams/hook", &HeaderMap::new(), body).await;

        let task = rx.pop().await.unwrap();
        assert_eq!(task.notification_sink.as_deref(), Some("http://teams.example.com/cb"));
    }

    #[tokio::test]
    async fn closed_queue_still_logs_and_acks() {
        let (ingress, _rx) = ingress(RelayConfig::default());
        ingress.queue.close();

        let (reply, status) = ingress.handle("/hook", &HeaderMap::new(), br#"{"a": 1}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert!(matches!(reply, IngressReply::Ack(_)));
        assert_eq!(ingress.logs().len().await, 1);
    }
}
