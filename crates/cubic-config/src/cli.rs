//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments for the cubic demo.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cubic", about = "Cubic voxel world engine")]
pub struct CliArgs {
    /// World seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Horizontal view distance in chunks.
    #[arg(long)]
    pub view_distance: Option<u32>,

    /// Directory for saved chunks (enables on-disk storage).
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Number of simulation ticks to run before exiting.
    #[arg(long, default_value_t = 64)]
    pub ticks: u32,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.world.seed = seed;
        }
        if let Some(vd) = args.view_distance {
            self.streaming.view_distance = vd;
        }
        if let Some(ref dir) = args.save_dir {
            self.world.save_dir = Some(dir.clone());
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            seed: Some(77),
            save_dir: Some(PathBuf::from("saves")),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.world.seed, 77);
        assert_eq!(config.world.save_dir, Some(PathBuf::from("saves")));
        // Non-overridden fields retain defaults
        assert_eq!(config.streaming.view_distance, 4);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["cubic", "--view-distance", "6", "--ticks", "10"]);
        assert_eq!(args.view_distance, Some(6));
        assert_eq!(args.ticks, 10);
        assert!(args.seed.is_none());
    }
}
