//! Configuration for the cubic world engine.
//!
//! Settings persist to disk as a RON file, can be overridden from the command
//! line via clap, and support hot-reload detection.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, PoolConfig, StreamingConfig, WorldConfig, default_config_dir};
pub use error::ConfigError;
