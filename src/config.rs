use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logbuf::MAX_LOGS;
use crate::types::RouteProfile;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5678";
pub const DEFAULT_SINK_FIELD: &str = "response_url";
pub const DEFAULT_ACK_TEXT: &str = "processing, please wait";
pub const DEFAULT_TIMEOUT_MESSAGE: &str =
    "⏱️ The automation service did not respond in time. Please try again later.";

/// Behaviour of the relay core: where tasks go and how failures are reported.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay target used when no route profile matches.
    pub base_url: String,

    /// Configuration table, first match wins.
    pub routes: Vec<RouteProfile>,

    /// Payload field carrying the notification sink.
    pub sink_field: String,

    /// Bound on a single forward attempt.
    pub forward_timeout: Duration,

    /// Bound on a single notification post.
    pub notify_timeout: Duration,

    /// Bound of the log buffer.
    pub max_logs: usize,

    /// Text of the immediate acknowledgment.
    pub ack_text: String,

    /// Notification text sent when a forward times out.
    pub timeout_message: String,

    /// Optional platform credential. Loaded for the process only; it is never
    /// attached to forwards or notifications, whose URLs callers control.
    pub platform_token: Option<String>,

    /// Cap on inbound body size. `None` accepts bodies of any size.
    pub max_body_bytes: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            routes: Vec::new(),
            sink_field: DEFAULT_SINK_FIELD.to_string(),
            forward_timeout: Duration::from_secs(15),
            notify_timeout: Duration::from_secs(5),
            max_logs: MAX_LOGS,
            ack_text: DEFAULT_ACK_TEXT.to_string(),
            timeout_message: DEFAULT_TIMEOUT_MESSAGE.to_string(),
            platform_token: None,
            max_body_bytes: None,
        }
    }
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_route(mut self, route: RouteProfile) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn with_max_logs(mut self, max_logs: usize) -> Self {
        self.max_logs = max_logs;
        self
    }

    pub fn with_sink_field(mut self, field: impl Into<String>) -> Self {
        self.sink_field = field.into();
        self
    }

    pub fn with_timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    pub fn with_max_body_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RelayConfig::default();

        if let Some(base) = non_empty(&lookup, "RELAY_TARGET_BASE_URL")
            .or_else(|| non_empty(&lookup, "N8N_WEBHOOK_BASE_URL"))
        {
            config.base_url = base;
        }
        if let Some(routes) = non_empty(&lookup, "RELAY_ROUTES") {
            config.routes = parse_routes(&routes)?;
        }
        if let Some(field) = non_empty(&lookup, "RELAY_SINK_FIELD") {
            config.sink_field = field;
        }
        if let Some(secs) = non_empty(&lookup, "RELAY_FORWARD_TIMEOUT_SECS") {
            config.forward_timeout = parse_secs("RELAY_FORWARD_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = non_empty(&lookup, "RELAY_NOTIFY_TIMEOUT_SECS") {
            config.notify_timeout = parse_secs("RELAY_NOTIFY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(max) = non_empty(&lookup, "RELAY_MAX_LOGS") {
            config.max_logs = max
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid("RELAY_MAX_LOGS", &max, e.to_string()))?;
        }
        if let Some(text) = non_empty(&lookup, "RELAY_ACK_TEXT") {
            config.ack_text = text;
        }
        if let Some(text) = non_empty(&lookup, "RELAY_TIMEOUT_MESSAGE") {
            config.timeout_message = text;
        }
        if let Some(limit) = non_empty(&lookup, "RELAY_MAX_BODY_BYTES") {
            let bytes = limit
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid("RELAY_MAX_BODY_BYTES", &limit, e.to_string()))?;
            config.max_body_bytes = (bytes > 0).then_some(bytes);
        }
        config.platform_token = non_empty(&lookup, "PLATFORM_TOKEN")
            .or_else(|| non_empty(&lookup, "SLACK_BOT_TOKEN"));

        Ok(config)
    }

    fn profile_for(&self, subpath: &str) -> Option<&RouteProfile> {
        self.routes.iter().find(|route| route.matches(subpath))
    }

    /// Relay target base URL for `subpath`.
    pub fn base_url_for(&self, subpath: &str) -> &str {
        self.profile_for(subpath)
            .and_then(|route| route.base_url.as_deref())
            .unwrap_or(&self.base_url)
    }

    /// Payload field holding the notification sink for `subpath`.
    pub fn sink_field_for(&self, subpath: &str) -> &str {
        self.profile_for(subpath)
            .and_then(|route| route.sink_field.as_deref())
            .unwrap_or(&self.sink_field)
    }

    /// Full forward URL: `{base}/{subpath}`.
    pub fn target_url(&self, subpath: &str) -> String {
        format!(
            "{}/{}",
            self.base_url_for(subpath).trim_end_matches('/'),
            subpath.trim_start_matches('/'),
        )
    }
}

/// Output format of the process log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Listener settings of the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();
        if let Some(addr) = non_empty(&lookup, "BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(port) = non_empty(&lookup, "PORT") {
            config.port = port
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("PORT", &port, e.to_string()))?;
        }
        if let Some(format) = non_empty(&lookup, "RELAY_LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "text" => LogFormat::Pretty,
                _ => return Err(ConfigError::invalid("RELAY_LOG_FORMAT", &format, "expected json or pretty")),
            };
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_addr, self.port);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", &raw, e.to_string()))
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs = value
        .parse::<f64>()
        .map_err(|e| ConfigError::invalid(key, value, e.to_string()))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::invalid(key, value, "must be a positive number of seconds"));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Parse `prefix=base_url[;sink=field]` entries separated by `,`.
///
/// The base URL may be left empty to override only the sink field.
fn parse_routes(raw: &str) -> Result<Vec<RouteProfile>, ConfigError> {
    let mut routes = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.split(';').map(str::trim);
        let head = parts.next().unwrap_or_default();
        let Some((prefix, base_url)) = head.split_once('=') else {
            return Err(ConfigError::invalid("RELAY_ROUTES", entry, "expected prefix=base_url"));
        };
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigError::invalid("RELAY_ROUTES", entry, "empty prefix"));
        }

        let mut route = RouteProfile::new(prefix);
        let base_url = base_url.trim();
        if !base_url.is_empty() {
            route = route.with_base_url(base_url);
        }

        for option in parts.filter(|p| !p.is_empty()) {
            match option.split_once('=') {
                Some(("sink", field)) if !field.trim().is_empty() => {
                    route = route.with_sink_field(field.trim());
                }
                _ => return Err(ConfigError::invalid("RELAY_ROUTES", entry, format!("unknown option {:?}", option))),
            }
        }
        routes.push(route);
    }
    Ok(routes)
}
