pub mod capacity;
pub mod channel;
pub mod codec;
pub mod config;
pub mod engine;
mod error;
mod metrics;
pub mod mutation;
pub mod navigation;
pub mod scheduler;
pub mod state;
mod utils;

pub use capacity::{CapacityReadout, CapacitySnapshot, MAX_CHANNEL_LENGTH};
pub use channel::{Channel, MemoryChannel, NavigationEvent, WriteMode};
pub use config::{ConfigError, EngineConfig};
pub use engine::{
    EditorEngine, EngineCommand, EngineHandle, EngineSnapshot, FlushOutcome, spawn_engine,
};
pub use error::AppError;
pub use metrics::{MetricSummary, SyncReport};
pub use mutation::TextSurface;
pub use state::{LoadStatus, SyncState};

pub fn init_logging() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}
