use tracing::{error, info, warn};
use tracing_sumo_sink::config::ShipperConfig;
use tracing_sumo_sink::env::SUMO_LOG_URL_ENV;
use tracing_sumo_sink::init::init_tracing;

/// Ships to the collector named by `SUMO_LOG_URL`, for example:
///
/// ```text
/// SUMO_LOG_URL=https://collectors.example.com/receiver/v1/http/XXXX \
///     cargo run --example http_collector
/// ```
///
/// Without the variable the shipper still runs but drops every batch.
#[tokio::main]
async fn main() {
    let config = ShipperConfig::from_env()
        .expect("valid SUMO_LOG_* environment")
        .with_source_category("examples/http");
    if config.url.is_none() {
        eprintln!("{SUMO_LOG_URL_ENV} is not set, batches will be dropped");
    }

    let guard = init_tracing(config).expect("init tracing");

    info!(service = "checkout", "http collector example started");
    warn!(latency_ms = 812, "slow upstream");
    error!(order_id = 42, "payment declined");

    guard.stop().await;
    println!("{:?}", guard.stats());
}
