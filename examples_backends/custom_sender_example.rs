use async_trait::async_trait;
use tracing::{error, info};
use tracing_sumo_sink::{
    config::ShipperConfig,
    error::SendError,
    init::{init_tracing_with_config, LayerConfig},
    sink::{MessageSender, SourceMetadata},
};

/// Example of shipping batches somewhere other than an HTTP collector by
/// implementing [`MessageSender`] directly. Here every batch is printed.
struct StdoutSender;

#[async_trait]
impl MessageSender for StdoutSender {
    fn can_try_send(&self) -> bool {
        true
    }

    async fn try_send(&self, body: &str, metadata: &SourceMetadata) -> Result<(), SendError> {
        print!("[{}/{}@{}]\n{}", metadata.category, metadata.name, metadata.host, body);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let config = ShipperConfig::default()
        .with_source_name("custom-sender-example")
        .with_source_category("demo");
    let layer_config = LayerConfig {
        layout: "{level} {target}: {message}{fields}".to_string(),
        enable_stdout: false,
        ..LayerConfig::default()
    };
    let guard = init_tracing_with_config(StdoutSender, config, layer_config).expect("init tracing");

    info!("custom sender example started");
    error!(backend = "stdout", "simulated error sent via custom sender");

    guard.stop().await;
}
