pub mod record;
pub mod sink;
pub mod layer;
pub mod layout;

pub mod buffer;
pub mod cost;
pub mod flush;
pub mod shipper;
pub mod stats;

pub mod http;
pub mod noop_sink;

pub mod config;
pub mod env;
pub mod error;
pub mod init;

pub use buffer::EvictingBuffer;
pub use config::ShipperConfig;
pub use cost::{CostAssigner, StringLengthCost, UnitCost};
pub use error::{ConfigError, InitError, SendError};
pub use flush::{BufferFlushingTask, FlushHandle, FlushOutcome, FlushPolicy, FlushTrigger};
pub use http::HttpSender;
pub use init::{init_tracing, init_tracing_with_config, LayerConfig, ShipperGuard};
pub use layer::SumoLayer;
pub use layout::Layout;
pub use noop_sink::NoopSender;
pub use shipper::LogShipper;
pub use sink::{MessageSender, SourceMetadata};
pub use stats::{ShipperStats, StatsSnapshot};
