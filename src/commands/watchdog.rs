use anyhow::{Context, Result};
use chrono::Datelike;
use std::collections::HashSet;
use std::path::Path;

use crate::agent;
use crate::config::StatsBackend;
use crate::limits::{EngineSettings, PassReport, ViewState};
use crate::media::{self, MediaServerClient};

use super::utils::{format_effective_week, format_week, init_logging, load};

/// Start the watchdog in the foreground
pub fn run(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let config = load(config_path)?;

    println!("WatchWise v{}", env!("CARGO_PKG_VERSION"));
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(agent::run_watchdog(config))
}

/// Run one enforcement pass now, for everybody or a single user
pub fn trigger(config_path: Option<&Path>, user: Option<String>, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let config = load(config_path)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match user {
        Some(user_id) => runtime.block_on(async {
            let engine = agent::build_engine(&config).await?;
            match engine.user(&user_id) {
                Some(user) => {
                    let outcome = engine.tick(&user_id).await;
                    println!("{} ({}): {:?}", user.name, user_id, outcome);
                }
                None => println!("{}: unknown", user_id),
            }
            Ok::<(), anyhow::Error>(())
        }),
        None => {
            let report = runtime.block_on(agent::run_pass_once(&config))?;
            print_report(&report);
            Ok(())
        }
    }
}

/// Show watch time and limits without changing anything
pub fn status(config_path: Option<&Path>, user: Option<String>, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let config = load(config_path)?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let engine = agent::build_engine(&config).await?;

        println!("Watch Time Status ({})", engine.current_day());
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let ids: Vec<String> = match user {
            Some(id) => vec![id],
            None => engine.users().iter().map(|u| u.id.clone()).collect(),
        };

        for id in ids {
            let mut view = ViewState::new();
            engine
                .refresh(&mut view, &id)
                .await
                .with_context(|| format!("Cannot show user {}", id))?;
            println!("  {}", view.summary());
        }

        match engine.backup().load_all() {
            Ok(store) => {
                println!();
                println!(
                    "Folder backup: {} users in {}",
                    store.len(),
                    engine.backup().path().display()
                );
            }
            Err(e) => tracing::warn!("{}", e),
        }

        Ok::<(), anyhow::Error>(())
    })
}

/// List every media server user and how limits apply to them
pub fn users(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let config = load(config_path)?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let client = media::build_http_client(&config)?;
        let server = media::build_media_client(&config, client)?;
        let all = server
            .list_users()
            .await
            .context("Failed to read users from the media server")?;

        let settings = EngineSettings::from_config(&config);
        let exempt: HashSet<&String> = config.limits.no_limit_users.iter().collect();
        let weekday = chrono::Local::now().weekday();

        println!("{:<34} {:<20} {}", "ID", "NAME", "LIMIT TODAY");
        for user in &all {
            let limit = if exempt.contains(&user.id) {
                "no limit".to_string()
            } else {
                format!("{} min", settings.policy.effective_limit(&user.id, weekday))
            };
            println!("{:<34} {:<20} {}", user.id, user.name, limit);
        }

        Ok::<(), anyhow::Error>(())
    })
}

/// Validate the config file and print what it resolves to
pub fn check_config(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let config = load(config_path)?;

    println!("✓ Configuration is valid");
    println!();
    println!("Server:       {}", config.server_host()?);
    match config.stats.backend {
        StatsBackend::PlaybackReporting => println!("Statistics:   Playback Reporting plugin"),
        StatsBackend::Jellystats => println!(
            "Statistics:   Jellystats at {}",
            config.stats.host.as_deref().unwrap_or("?")
        ),
    }
    if config.limits.polling_interval > 0 {
        println!("Polling:      every {} min", config.limits.polling_interval);
    } else {
        println!("Polling:      on /trigger only");
    }
    println!("Listen:       {}", config.http.bind);
    println!("Backup file:  {}", config.backup.path.display());

    println!();
    println!("Limits (minutes):");
    let policy = EngineSettings::from_config(&config).policy;
    println!("  {:<34} {}", "default", format_week(policy.default_spec()));

    let mut overridden: Vec<&String> = policy.override_users().collect();
    overridden.sort();
    for user_id in overridden {
        let malformed = policy
            .override_for(user_id)
            .is_some_and(|spec| !spec.is_well_formed());
        let note = if malformed { "  (invalid, default applies)" } else { "" };
        println!(
            "  {:<34} {}{}",
            user_id,
            format_effective_week(&policy, user_id),
            note
        );
    }

    if !config.limits.no_limit_users.is_empty() {
        println!();
        println!("No-limit users:   {}", config.limits.no_limit_users.join(", "));
    }
    if !config.limits.no_limit_folders.is_empty() {
        println!("No-limit folders: {}", config.limits.no_limit_folders.join(", "));
    }

    Ok(())
}

fn print_report(report: &PassReport) {
    if report.rollover {
        println!("New day {}, limits reset", report.day);
    }
    for outcome in &report.outcomes {
        println!("  {:<20} {:?}", outcome.name, outcome.outcome);
    }
    if report.outcomes.is_empty() {
        println!("No users are subject to limits");
    }
}
