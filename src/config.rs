//! Settings for the buffering, flushing and delivery engine.
//!
//! All durations and counts must be positive; [`ShipperConfig::validate`]
//! rejects anything else so a bad setting fails at startup instead of at
//! the first flush.

use crate::env::{self, env_opt, env_or};
use crate::error::ConfigError;
use crate::flush::FlushPolicy;
use crate::sink::SourceMetadata;
use reqwest::Url;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(60_000);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_FLUSH_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_FLUSHING_ACCURACY: Duration = Duration::from_millis(250);
pub const DEFAULT_MESSAGES_PER_REQUEST: usize = 100;
pub const DEFAULT_MAX_QUEUE_SIZE_BYTES: usize = 1_000_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_SOURCE_NAME: &str = "tracing-sumo";
pub const DEFAULT_CLIENT_NAME: &str = "sumo-rust-sender";

/// Configuration of one [`LogShipper`](crate::shipper::LogShipper).
///
/// `url = None` is valid: the shipper starts, accepts messages and drops
/// every batch with a warning instead of sending it.
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Collector endpoint. `None` disables sending.
    pub url: Option<String>,

    /// Source name, category and host sent with every batch.
    pub source: SourceMetadata,

    /// Value of the `X-Sumo-Client` header.
    pub client_name: String,

    /// Upper bound for one HTTP attempt, connect included.
    pub connection_timeout: Duration,

    /// Wait between two attempts of the same batch.
    pub retry_interval: Duration,

    /// Maximum time between two flushes even if the batch is not full.
    pub max_flush_interval: Duration,

    /// How often the flushing task wakes up to check its triggers.
    pub flushing_accuracy: Duration,

    /// Batch size and size trigger.
    pub messages_per_request: usize,

    /// Queue capacity in bytes of formatted log lines.
    pub max_queue_size_bytes: usize,

    /// Retries of one batch before it is dropped. `None` retries until
    /// success or shutdown.
    pub max_retries: Option<u32>,

    /// How long `stop` waits for the final flush.
    pub shutdown_timeout: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            url: None,
            source: SourceMetadata::new(DEFAULT_SOURCE_NAME, "", local_hostname()),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_flush_interval: DEFAULT_MAX_FLUSH_INTERVAL,
            flushing_accuracy: DEFAULT_FLUSHING_ACCURACY,
            messages_per_request: DEFAULT_MESSAGES_PER_REQUEST,
            max_queue_size_bytes: DEFAULT_MAX_QUEUE_SIZE_BYTES,
            max_retries: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ShipperConfig {
    /// Default settings shipping to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source.name = name.into();
        self
    }

    pub fn with_source_category(mut self, category: impl Into<String>) -> Self {
        self.source.category = category.into();
        self
    }

    pub fn with_source_host(mut self, host: impl Into<String>) -> Self {
        self.source.host = host.into();
        self
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_flush_interval(mut self, interval: Duration) -> Self {
        self.max_flush_interval = interval;
        self
    }

    pub fn with_flushing_accuracy(mut self, accuracy: Duration) -> Self {
        self.flushing_accuracy = accuracy;
        self
    }

    pub fn with_messages_per_request(mut self, messages: usize) -> Self {
        self.messages_per_request = messages;
        self
    }

    pub fn with_max_queue_size_bytes(mut self, bytes: usize) -> Self {
        self.max_queue_size_bytes = bytes;
        self
    }

    pub fn with_max_retries(mut self, retries: Option<u32>) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Check every setting.
    ///
    /// **Returns**
    /// - `Err(ConfigError::NotPositive)` for a zero duration or count.
    /// - `Err(ConfigError::InvalidUrl)` if `url` is set but is not an
    ///   absolute `http`/`https` URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("connection_timeout", self.connection_timeout),
            ("retry_interval", self.retry_interval),
            ("max_flush_interval", self.max_flush_interval),
            ("flushing_accuracy", self.flushing_accuracy),
            ("shutdown_timeout", self.shutdown_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.messages_per_request == 0 {
            return Err(ConfigError::NotPositive("messages_per_request"));
        }
        if self.max_queue_size_bytes == 0 {
            return Err(ConfigError::NotPositive("max_queue_size_bytes"));
        }
        if let Some(url) = &self.url {
            parse_collector_url(url)?;
        }
        Ok(())
    }

    /// Flush scheduling settings derived from this config.
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy {
            messages_per_request: self.messages_per_request,
            max_flush_interval: self.max_flush_interval,
            flushing_accuracy: self.flushing_accuracy,
            retry_interval: self.retry_interval,
            max_retries: self.max_retries,
        }
    }

    /// Load configuration from `SUMO_LOG_*` environment variables.
    ///
    /// Unset variables keep their defaults; see [`crate::env`] for the
    /// list. The result is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` if a variable does not parse, or
    /// any error [`validate`](Self::validate) reports.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            url: env_opt(env::SUMO_LOG_URL_ENV),
            source: SourceMetadata::new(
                env_or(env::SUMO_LOG_SOURCE_NAME_ENV, &defaults.source.name),
                env_or(env::SUMO_LOG_SOURCE_CATEGORY_ENV, &defaults.source.category),
                env_or(env::SUMO_LOG_SOURCE_HOST_ENV, &defaults.source.host),
            ),
            client_name: env_or(env::SUMO_LOG_CLIENT_NAME_ENV, &defaults.client_name),
            connection_timeout: parse_millis(env::SUMO_LOG_CONNECTION_TIMEOUT_MS_ENV)?
                .unwrap_or(defaults.connection_timeout),
            retry_interval: parse_millis(env::SUMO_LOG_RETRY_INTERVAL_MS_ENV)?
                .unwrap_or(defaults.retry_interval),
            max_flush_interval: parse_millis(env::SUMO_LOG_MAX_FLUSH_INTERVAL_MS_ENV)?
                .unwrap_or(defaults.max_flush_interval),
            flushing_accuracy: parse_millis(env::SUMO_LOG_FLUSHING_ACCURACY_MS_ENV)?
                .unwrap_or(defaults.flushing_accuracy),
            messages_per_request: parse_var(env::SUMO_LOG_MESSAGES_PER_REQUEST_ENV)?
                .unwrap_or(defaults.messages_per_request),
            max_queue_size_bytes: parse_var(env::SUMO_LOG_MAX_QUEUE_SIZE_BYTES_ENV)?
                .unwrap_or(defaults.max_queue_size_bytes),
            max_retries: parse_var(env::SUMO_LOG_MAX_RETRIES_ENV)?,
            shutdown_timeout: defaults.shutdown_timeout,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Parse and check a collector URL.
pub fn parse_collector_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

/// Machine name used as the default source host.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn parse_var<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(var) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                var,
                value,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn parse_millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(var)?.map(Duration::from_millis))
}
