use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded inbound body handed to the relay target unmodified.
///
/// Keys keep their arrival order.
pub type Payload = Map<String, Value>;

/// A unit of forwarding work.
///
/// Built by the ingress path at enqueue time and never mutated afterwards.
/// The worker consumes each task exactly once and then drops it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Downstream route, the request path without its leading `/`.
    pub subpath: String,

    /// Form fields or JSON object of the inbound event.
    pub payload: Payload,

    /// Where to post a follow-up message when forwarding fails.
    pub notification_sink: Option<String>,

    /// Id of the log entry written for this event at ingress.
    pub log_id: Option<u64>,
}

impl Task {
    pub fn new(subpath: impl Into<String>, payload: Payload) -> Self {
        Self {
            subpath: subpath.into(),
            payload,
            notification_sink: None,
            log_id: None,
        }
    }

    /// Attach a notification sink.
    pub fn with_notification_sink(mut self, sink: impl Into<String>) -> Self {
        self.notification_sink = Some(sink.into());
        self
    }

    /// Link the task to the log entry recorded at ingress.
    pub fn with_log_id(mut self, log_id: u64) -> Self {
        self.log_id = Some(log_id);
        self
    }
}

/// Forward result recorded on a log entry after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

/// Snapshot of one inbound event kept for operational inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic id assigned by the log buffer on append.
    pub id: u64,

    pub timestamp: DateTime<Utc>,

    /// Original request path, including the leading `/`.
    pub path: String,

    pub headers: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<Payload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LogStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped with the current time. The id is assigned on append.
    pub fn new(path: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            path: path.into(),
            headers,
            form: None,
            json: None,
            status: None,
            error: None,
        }
    }

    pub fn with_form(mut self, form: Payload) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }
}

/// One row of the relay configuration table.
///
/// A profile applies to every subpath whose first segment equals `prefix`.
/// It can redirect those events to another relay target and read the
/// notification sink from a different payload field. The subpath itself is
/// always forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteProfile {
    pub prefix: String,

    /// Relay target base URL for this route. Falls back to the default target.
    pub base_url: Option<String>,

    /// Payload field carrying the notification sink. Falls back to the default field.
    pub sink_field: Option<String>,
}

impl RouteProfile {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_matches('/').to_string(),
            base_url: None,
            sink_field: None,
        }
    }

    /// Send this route's events to another relay target.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Read the notification sink from another payload field.
    pub fn with_sink_field(mut self, field: impl Into<String>) -> Self {
        self.sink_field = Some(field.into());
        self
    }

    /// Whether this profile applies to `subpath`.
    pub fn matches(&self, subpath: &str) -> bool {
        let first = subpath
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or("");
        first == self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_matches_first_segment_only() {
        let profile = RouteProfile::new("/slack/");
        assert_eq!(profile.prefix, "slack");
        assert!(profile.matches("slack"));
        assert!(profile.matches("slack/webhook/abc"));
        assert!(profile.matches("/slack/webhook"));
        assert!(!profile.matches("slacker/webhook"));
        assert!(!profile.matches("teams/slack"));
    }

    #[test]
    fn log_entry_omits_absent_fields() {
        let entry = LogEntry::new("/hook", BTreeMap::new());
        let value = serde_json::to_value(&entry).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("timestamp"));
        assert!(!object.contains_key("status"));
        assert!(!object.contains_key("form"));
        assert!(!object.contains_key("json"));
    }
}
