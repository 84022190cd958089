//! Environment variable names read by [`ShipperConfig::from_env`].
//!
//! These are purely helpers; the core types never touch the environment
//! on their own.
//!
//! [`ShipperConfig::from_env`]: crate::config::ShipperConfig::from_env

/// Collector endpoint, e.g. `https://collectors.example.com/receiver/v1/http/XYZ`.
/// Leaving it unset disables shipping.
pub const SUMO_LOG_URL_ENV: &str = "SUMO_LOG_URL";

/// Value of the `X-Sumo-Name` header.
pub const SUMO_LOG_SOURCE_NAME_ENV: &str = "SUMO_LOG_SOURCE_NAME";

/// Value of the `X-Sumo-Category` header.
pub const SUMO_LOG_SOURCE_CATEGORY_ENV: &str = "SUMO_LOG_SOURCE_CATEGORY";

/// Value of the `X-Sumo-Host` header. Defaults to the machine name.
pub const SUMO_LOG_SOURCE_HOST_ENV: &str = "SUMO_LOG_SOURCE_HOST";

/// Value of the `X-Sumo-Client` header.
pub const SUMO_LOG_CLIENT_NAME_ENV: &str = "SUMO_LOG_CLIENT_NAME";

/// Durations, in milliseconds.
pub const SUMO_LOG_CONNECTION_TIMEOUT_MS_ENV: &str = "SUMO_LOG_CONNECTION_TIMEOUT_MS";
pub const SUMO_LOG_RETRY_INTERVAL_MS_ENV: &str = "SUMO_LOG_RETRY_INTERVAL_MS";
pub const SUMO_LOG_MAX_FLUSH_INTERVAL_MS_ENV: &str = "SUMO_LOG_MAX_FLUSH_INTERVAL_MS";
pub const SUMO_LOG_FLUSHING_ACCURACY_MS_ENV: &str = "SUMO_LOG_FLUSHING_ACCURACY_MS";

/// Messages per request; also the size trigger.
pub const SUMO_LOG_MESSAGES_PER_REQUEST_ENV: &str = "SUMO_LOG_MESSAGES_PER_REQUEST";

/// Queue capacity in bytes.
pub const SUMO_LOG_MAX_QUEUE_SIZE_BYTES_ENV: &str = "SUMO_LOG_MAX_QUEUE_SIZE_BYTES";

/// Optional cap on retries of one batch. Unset means retry until shutdown.
pub const SUMO_LOG_MAX_RETRIES_ENV: &str = "SUMO_LOG_MAX_RETRIES";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating an empty value as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
