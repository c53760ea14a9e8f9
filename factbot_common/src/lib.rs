/**
 Factbot_common
 */

pub mod cli;
pub mod config;

/// Factbot common prelude
pub mod prelude {
    pub use clap::Parser;

    pub use crate::config::{BotConfig, ConfigError, ImageConfig, LivenessConfig, StorageBackend, StorageConfig};
    pub use crate::cli::Args;
    pub use crate::cli::Commands;
}
