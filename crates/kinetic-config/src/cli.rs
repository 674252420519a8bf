//! Command-line argument parsing for the Kinetic loopback demo.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Kinetic command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "kinetic", about = "Predicted character movement loopback")]
pub struct CliArgs {
    /// Number of simulation ticks to run.
    #[arg(long, default_value_t = 600)]
    pub ticks: u32,

    /// Simulation tick rate in Hz.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// One-way latency in ticks.
    #[arg(long)]
    pub latency: Option<u32>,

    /// Unreliable packet loss probability (0.0 - 1.0).
    #[arg(long)]
    pub loss: Option<f32>,

    /// Seed for the packet loss generator.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Disable wall running.
    #[arg(long)]
    pub no_wall_run: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rate) = args.tick_rate {
            self.simulation.tick_rate = rate;
        }
        if let Some(latency) = args.latency {
            self.network.latency_ticks = latency;
        }
        if let Some(loss) = args.loss {
            self.network.unreliable_loss = loss.clamp(0.0, 1.0);
        }
        if let Some(seed) = args.seed {
            self.network.seed = seed;
        }
        if args.no_wall_run {
            self.wall_run.enabled = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
