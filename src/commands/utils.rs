use anyhow::Result;
use chrono::Weekday;
use std::path::Path;

use crate::config::{self, WatchdogConfig};
use crate::limits::{LimitPolicy, LimitSpec};

pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Initialize logging
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Find and load the configuration file
pub fn load(explicit: Option<&Path>) -> Result<WatchdogConfig> {
    let path = config::resolve_config_path(explicit)?;
    tracing::debug!("Using config file {}", path.display());
    config::load_config(&path)
}

/// Minutes per weekday, e.g. "Mon 60  Tue 60 ... Sun 120"
pub fn format_week(spec: &LimitSpec) -> String {
    WEEK.iter()
        .map(|day| format!("{} {:>3}", day, LimitPolicy::resolve(spec, *day)))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Minutes per weekday a user actually gets, overrides and fallbacks applied
pub fn format_effective_week(policy: &LimitPolicy, user_id: &str) -> String {
    WEEK.iter()
        .map(|day| format!("{} {:>3}", day, policy.effective_limit(user_id, *day)))
        .collect::<Vec<_>>()
        .join("  ")
}
