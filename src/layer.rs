use crate::cost::{CostAssigner, StringLengthCost};
use crate::layout::Layout;
use crate::record::LogRecord;
use crate::shipper::LogShipper;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never shipped: this crate's own diagnostics
/// and the HTTP stack used to deliver them.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    env!("CARGO_CRATE_NAME"),
    "reqwest",
    "hyper",
    "h2",
    "rustls",
];

/// `tracing_subscriber` layer that renders events with a [`Layout`] and
/// queues the resulting lines on a [`LogShipper`].
///
/// `on_event` never performs I/O: it formats the line and pushes it into
/// the shipper's buffer. Delivery happens on the shipper's own task.
///
/// Events below `min_level` (by default `DEBUG`, so `TRACE` is skipped)
/// and events from ignored targets are not shipped.
pub struct SumoLayer<C = StringLengthCost> {
    shipper: Arc<LogShipper<C>>,
    layout: Layout,
    min_level: Level,
    ignored_targets: Vec<String>,
}

impl<C> SumoLayer<C>
where
    C: CostAssigner<String> + 'static,
{
    pub fn new(shipper: Arc<LogShipper<C>>) -> Self {
        Self {
            shipper,
            layout: Layout::default(),
            min_level: Level::DEBUG,
            ignored_targets: DEFAULT_IGNORED_TARGETS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Least severe level still shipped.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Also skip events whose target is `prefix` or lies below it.
    pub fn ignore_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_targets.push(prefix.into());
        self
    }

    pub fn shipper(&self) -> &Arc<LogShipper<C>> {
        &self.shipper
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| {
            target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<S, C> Layer<S> for SumoLayer<C>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    C: CostAssigner<String> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // more verbose levels compare greater
        if *meta.level() > self.min_level {
            return;
        }
        if self.is_ignored(meta.target()) {
            return;
        }

        let record = LogRecord::from_event(event);
        self.shipper.accept(self.layout.render(&record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShipperConfig;
    use crate::noop_sink::NoopSender;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn shipper() -> Arc<LogShipper> {
        Arc::new(LogShipper::new(&ShipperConfig::default(), NoopSender).unwrap())
    }

    #[test]
    fn trace_is_skipped_by_default() {
        let shipper = shipper();
        let subscriber = Registry::default().with(SumoLayer::new(Arc::clone(&shipper)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!(target: "app", "noise");
            tracing::debug!(target: "app", "details");
            tracing::error!(target: "app", "broken");
        });

        assert_eq!(shipper.stats().accepted, 2);
        assert_eq!(shipper.pending(), 2);
    }

    #[test]
    fn min_level_is_configurable() {
        let shipper = shipper();
        let layer = SumoLayer::new(Arc::clone(&shipper)).with_min_level(Level::WARN);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", "fine");
            tracing::warn!(target: "app", "careful");
            tracing::error!(target: "app", "broken");
        });

        assert_eq!(shipper.pending(), 2);
    }

    #[test]
    fn own_and_transport_targets_are_ignored() {
        let shipper = shipper();
        let layer = SumoLayer::new(Arc::clone(&shipper)).ignore_target("noisy");
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "tracing_sumo_sink::flush", "retrying");
            tracing::debug!(target: "hyper::proto", "frame");
            tracing::info!(target: "noisy::inner", "chatter");
            tracing::info!(target: "hyperion", "not a transport target");
            tracing::info!(target: "app", "kept");
        });

        assert_eq!(shipper.pending(), 2);
    }

    #[tokio::test]
    async fn rendered_line_reaches_sender() {
        use crate::error::SendError;
        use crate::sink::{MessageSender, SourceMetadata};
        use async_trait::async_trait;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Capture(Mutex<Vec<String>>);

        #[async_trait]
        impl MessageSender for Capture {
            fn can_try_send(&self) -> bool {
                true
            }

            async fn try_send(&self, body: &str, _m: &SourceMetadata) -> Result<(), SendError> {
                self.0.lock().unwrap().push(body.to_string());
                Ok(())
            }
        }

        let sender = Arc::new(Capture::default());
        let shipper = Arc::new(LogShipper::new(&ShipperConfig::default(), Arc::clone(&sender)).unwrap());
        let layout = Layout::parse("{level} {target}: {message}{fields}").unwrap();
        let subscriber = Registry::default().with(SumoLayer::new(Arc::clone(&shipper)).with_layout(layout));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "shop", order_id = 7, "order placed");
        });
        shipper.stop().await;

        assert_eq!(
            *sender.0.lock().unwrap(),
            vec!["INFO shop: order placed order_id=7\n".to_string()]
        );
    }
}
