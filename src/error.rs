use std::fmt;

/// Errors returned when handing work to the relay fails.
#[derive(Debug, PartialEq, Eq)]
pub enum RelayError {
    /// The relay has been shut down and no longer accepts tasks.
    Shutdown,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Shutdown =>
                write!(f, "relay is shut down"),
        }
    }
}

impl std::error::Error for RelayError {}

/// Final outcome of forwarding one task to the relay target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    Failed(FailureReason),
}

impl ForwardOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ForwardOutcome::Delivered)
    }
}

/// Reasons why a forward attempt failed.
///
/// Timeouts are kept apart from every other failure because they
/// produce a fixed, user-facing message instead of the error detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No response within the forward timeout.
    Timeout,

    /// Connection refused, DNS failure, broken body and similar.
    Network(String),

    /// The relay target answered with a non-2xx status.
    RemoteStatus(u16),

    /// Processing the task panicked inside the worker.
    Panicked,
}

impl FailureReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FailureReason::Timeout)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout =>
                write!(f, "request timed out"),
            FailureReason::Network(detail) =>
                write!(f, "network error: {}", detail),
            FailureReason::RemoteStatus(status) =>
                write!(f, "relay target returned HTTP {}", status),
            FailureReason::Panicked =>
                write!(f, "worker panicked while forwarding"),
        }
    }
}

/// Reasons why posting to a notification sink failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    Timeout,
    Network(String),
    RemoteStatus(u16),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Timeout =>
                write!(f, "notification timed out"),
            NotifyError::Network(detail) =>
                write!(f, "notification network error: {}", detail),
            NotifyError::RemoteStatus(status) =>
                write!(f, "notification sink returned HTTP {}", status),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } =>
                write!(f, "invalid value {:?} for {}: {}", value, key, reason),
        }
    }
}

impl std::error::Error for ConfigError {}
