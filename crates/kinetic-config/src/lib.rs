//! Configuration system for the Kinetic movement stack.
//!
//! Provides the tuning values for the movement simulator and its ability
//! controllers, persisted to disk as RON. Supports CLI overrides via clap,
//! hot-reload detection, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, FreezeConfig, JetpackConfig, NetworkConfig, PredictionConfig,
    SimulationConfig, TeleportConfig, ValidationConfig, WallJumpConfig, WallRunConfig,
    default_config_dir,
};
pub use error::ConfigError;
