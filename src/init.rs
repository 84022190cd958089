use crate::config::ShipperConfig;
use crate::error::InitError;
use crate::http::HttpSender;
use crate::layer::SumoLayer;
use crate::layout::{Layout, DEFAULT_LAYOUT};
use crate::shipper::LogShipper;
use crate::sink::MessageSender;
use crate::stats::StatsSnapshot;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer as _;
use tracing_subscriber::{EnvFilter, Registry};

/// Layer configuration.
///
/// Controls what the [`SumoLayer`] ships and whether events are also
/// printed to the console.
///
/// **Fields**
/// - `min_level`: least severe level that is shipped (`DEBUG` by default).
/// - `layout`: template rendered for every event, see [`crate::layout`].
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   stacked on top of the shipping layer. It honours `RUST_LOG` and falls
///   back to `info`.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub layout: String,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::DEBUG,
            layout: DEFAULT_LAYOUT.to_string(),
            enable_stdout: true,
        }
    }
}

/// Owner of the installed shipper.
///
/// Call [`stop`](Self::stop) before the runtime shuts down to deliver what
/// is still buffered. Dropping the guard without stopping only signals
/// shutdown; the task then flushes on its own if the runtime keeps running.
pub struct ShipperGuard {
    shipper: Arc<LogShipper>,
}

impl ShipperGuard {
    pub fn shipper(&self) -> &Arc<LogShipper> {
        &self.shipper
    }

    pub fn flush(&self) {
        self.shipper.flush();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shipper.stats()
    }

    /// Final flush and shutdown, bounded by the configured shutdown timeout.
    pub async fn stop(&self) {
        self.shipper.stop().await;
    }
}

impl Drop for ShipperGuard {
    fn drop(&mut self) {
        self.shipper.shutdown_in_background();
    }
}

/// Initialize global `tracing` subscriber shipping to the HTTP collector
/// described by `config`, with [`LayerConfig::default`].
///
/// Must be called from inside a tokio runtime.
///
/// **Errors**
/// - [`InitError::Config`] if `config` is invalid.
/// - [`InitError::NoRuntime`] outside a tokio runtime.
/// - [`InitError::SubscriberAlreadySet`] if a global subscriber exists.
pub fn init_tracing(config: ShipperConfig) -> Result<ShipperGuard, InitError> {
    let sender = HttpSender::from_config(&config)?;
    init_tracing_with_config(sender, config, LayerConfig::default())
}

/// Initialize global `tracing` subscriber with a custom sender and layer
/// settings.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`SumoLayer`] (and the `fmt`
/// layer when `enable_stdout` is set) as the global default subscriber
/// and starts the shipper's flushing task on the current runtime.
pub fn init_tracing_with_config<S>(
    sender: S,
    config: ShipperConfig,
    layer_config: LayerConfig,
) -> Result<ShipperGuard, InitError>
where
    S: MessageSender + 'static,
{
    let layout = Layout::parse(&layer_config.layout)?;
    let shipper = Arc::new(LogShipper::new(&config, sender)?);
    let layer = SumoLayer::new(Arc::clone(&shipper))
        .with_layout(layout)
        .with_min_level(layer_config.min_level);
    tokio::runtime::Handle::try_current().map_err(|_| InitError::NoRuntime)?;

    // the two stacks have different types, so each is installed separately
    let installed = if layer_config.enable_stdout {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(filter);
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.map_err(|_| InitError::SubscriberAlreadySet)?;

    shipper.start()?;
    Ok(ShipperGuard { shipper })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop_sink::NoopSender;

    #[test]
    fn defaults_ship_debug_with_console() {
        let config = LayerConfig::default();
        assert_eq!(config.min_level, Level::DEBUG);
        assert_eq!(config.layout, DEFAULT_LAYOUT);
        assert!(config.enable_stdout);
    }

    #[test]
    fn bad_layout_fails_before_installing() {
        let layer_config = LayerConfig {
            layout: "{bogus}".to_string(),
            ..LayerConfig::default()
        };
        let result = init_tracing_with_config(NoopSender, ShipperConfig::default(), layer_config);
        assert!(matches!(result, Err(InitError::Config(_))));
    }

    #[test]
    fn bad_config_fails_before_installing() {
        let config = ShipperConfig::default().with_messages_per_request(0);
        let result = init_tracing_with_config(NoopSender, config, LayerConfig::default());
        assert!(matches!(result, Err(InitError::Config(_))));
    }
}
