use std::time::Instant;
use tracing::error;

use tracing_sumo_sink::config::ShipperConfig;
use tracing_sumo_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_sumo_sink::noop_sink::NoopSender;

#[tokio::main]
async fn main() {
    let layer_config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };
    let guard = init_tracing_with_config(NoopSender, ShipperConfig::default(), layer_config)
        .expect("init tracing");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "default config: accepted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    guard.stop().await;
    println!("{:?}", guard.stats());
}
