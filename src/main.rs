use anyhow::Result;
use clap::Parser;

mod agent;
mod cli;
mod commands;
mod config;
mod limits;
mod media;

use cli::{Args, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.config.as_deref();

    match args.command {
        Commands::Run => commands::run(config, args.verbose),
        Commands::Trigger { user } => commands::trigger(config, user, args.verbose),
        Commands::Status { user } => commands::status(config, user, args.verbose),
        Commands::Users => commands::users(config, args.verbose),
        Commands::CheckConfig => commands::check_config(config, args.verbose),
    }
}
