//! Command-line options

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "display-manager")]
#[command(about = "Switch monitor inputs over DDC/CI from global hotkeys")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the bindings file (defaults to <config dir>/display-manager/config.json)
    #[arg(long, value_name = "PATH", env = "DISPLAY_MANAGER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "display_manager=trace" (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER", global = true)]
    pub log_level: Option<String>,

    /// Give up on a single DDC/CI call after this many milliseconds
    #[arg(
        long,
        value_name = "MS",
        env = "DISPLAY_MANAGER_VCP_TIMEOUT_MS",
        default_value_t = 2000,
        global = true
    )]
    pub vcp_timeout_ms: u64,

    /// Wait this long after switching a monitor's input
    #[arg(long, value_name = "MS", default_value_t = 500, global = true)]
    pub settle_ms: u64,
}

impl Cli {
    pub fn vcp_timeout(&self) -> Duration {
        Duration::from_millis(self.vcp_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Listen for hotkeys and apply the configured monitor settings (default)
    Run,
    /// Validate the bindings file and print what each hotkey does
    Check,
    /// Show the current input source of every monitor
    Inputs {
        /// Also show each output's DDC bus and preferred mode
        #[arg(short, long)]
        verbose: bool,
    },
    /// Toggle every monitor between DVI and HDMI 1
    Flip,
    /// Print the bindings file location
    ConfigPath,
}
