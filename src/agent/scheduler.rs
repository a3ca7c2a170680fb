use chrono::{DateTime, Local};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Timer for the periodic enforcement pass, with optional jitter
pub struct PollingScheduler {
    base_interval: Duration,
    jitter_range: Duration,
}

impl PollingScheduler {
    /// Create a new polling scheduler
    ///
    /// # Arguments
    /// * `interval_mins` - Base interval between passes in minutes
    /// * `jitter_secs` - Maximum extra delay in seconds
    pub fn new(interval_mins: u64, jitter_secs: u64) -> Self {
        Self {
            base_interval: Duration::from_secs(interval_mins * 60),
            jitter_range: Duration::from_secs(jitter_secs),
        }
    }

    /// Whether a timer should run at all; zero means externally triggered only
    pub fn is_enabled(&self) -> bool {
        !self.base_interval.is_zero()
    }

    /// Sleep until the next pass is due
    pub async fn sleep_until_next_poll(&self) {
        let sleep_duration = self.calculate_next_interval();
        tracing::debug!(
            "Sleeping for {} seconds until next pass",
            sleep_duration.as_secs()
        );
        sleep(sleep_duration).await;
    }

    /// Approximate wall-clock time of the next pass
    pub fn next_poll_time(&self) -> DateTime<Local> {
        let sleep_duration = self.calculate_next_interval();
        let offset = chrono::Duration::from_std(sleep_duration).unwrap_or(chrono::Duration::zero());
        Local::now() + offset
    }

    fn calculate_next_interval(&self) -> Duration {
        self.base_interval + self.random_jitter()
    }

    /// Random jitter in range [0, jitter_range]
    fn random_jitter(&self) -> Duration {
        let jitter_secs = rand::thread_rng().gen_range(0..=self.jitter_range.as_secs());
        Duration::from_secs(jitter_secs)
    }
}
