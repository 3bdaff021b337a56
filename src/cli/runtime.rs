use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runtime CLI for the adaptive learning layer.
#[derive(Parser, Debug)]
#[command(name = "adaptive-options")]
#[command(version)]
#[command(
    about = "Adaptive learning layer for options strategies",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus $ADAPTIVE_ENV overrides)
    #[arg(short, long, default_value = "config", env = "ADAPTIVE_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print orchestration status as JSON
    Status,

    /// Run rule-based learners over synthetic backtests end to end
    Demo {
        /// Capital to allocate
        #[arg(long, default_value = "100000")]
        capital: f64,
        /// Append a crash bar to the last backtest window
        #[arg(long)]
        shock: bool,
        /// RNG seed for the synthetic market data
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Evaluate market conditions on a synthetic window
    Evaluate {
        /// Bars in the evaluated window
        #[arg(long, default_value = "30")]
        bars: usize,
        /// Append a crash bar to the window
        #[arg(long)]
        shock: bool,
        /// RNG seed for the synthetic market data
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}
