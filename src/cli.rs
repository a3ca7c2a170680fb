use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// WatchWise media watchdog
///
/// Enforces daily watch-time limits on Jellyfin users by hiding their media
/// folders once the day's allowance is used up and restoring them later.
#[derive(Parser, Debug)]
#[command(name = "watchwise")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (default: /config/config.yaml, then config/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the watchdog with its timer and HTTP endpoints
    Run,
    /// Run one enforcement pass now
    Trigger {
        /// Only evaluate this user id
        #[arg(long)]
        user: Option<String>,
    },
    /// Show today's watch time and limits
    Status {
        /// Only show this user id
        #[arg(long)]
        user: Option<String>,
    },
    /// List media server users and their limit today
    Users,
    /// Validate the configuration and print resolved limits
    CheckConfig,
}
