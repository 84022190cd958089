use std::time::Duration;

/// Error returned when shipper settings are missing or out of range.
///
/// Raised at construction time; a running shipper never produces one.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("invalid collector url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid layout {template:?}: {reason}")]
    InvalidLayout { template: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Error returned by a single delivery attempt.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("sender has no collector url configured")]
    NotReady,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("collector responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("http request failed: {0}")]
    Transport(String),
}

/// Error returned when installing the global tracing subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,

    #[error("the flushing task needs a running tokio runtime")]
    NoRuntime,
}
