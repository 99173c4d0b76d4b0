// Library exports for the server binary and the integration tests
pub mod cli;
pub mod config;
pub mod config_file;
pub mod counts;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod prompt;
pub mod server;
pub mod service;
pub mod utils;
pub mod vision;
pub mod workspace;

// Re-export commonly used types
pub use config::AppConfig;
pub use counts::{parse_reply, CountsMap, DefectCategory, ModelReply};
pub use error::{CountError, ModelError};
pub use image_processing::{LabelRenderer, Sprite, SpriteBuilder};
pub use service::{CountOutcome, CountingService, HealthReport};
pub use vision::{GeminiClient, RemoteFile, VisionModel};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber; `RUST_LOG` overrides the verbosity flag
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("abacus_counter={0},tower_http={0}", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
