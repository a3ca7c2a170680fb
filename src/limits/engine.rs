use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::backup::FolderBackup;
use super::policy::LimitPolicy;
use super::state::{Clock, DayMarker, User, UserRuntimeState};
use super::view::{ViewState, progress};
use crate::config::WatchdogConfig;
use crate::media::{MediaServerClient, RemoteError, StatsSource};

/// Everything the engine needs from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub policy: LimitPolicy,
    pub no_limit_users: HashSet<String>,
    pub no_limit_folders: HashSet<String>,
    pub account_enable_on_day_reset: bool,
    pub user_timeout: Duration,
    pub backup_path: PathBuf,
    /// User ids named anywhere in the config, checked against the server
    pub configured_user_ids: Vec<String>,
}

impl EngineSettings {
    pub fn from_config(config: &WatchdogConfig) -> Self {
        let limits = &config.limits;

        let mut configured_user_ids: Vec<String> = config.view.default_user.iter().cloned().collect();
        configured_user_ids.extend(limits.user_limits.keys().cloned());
        configured_user_ids.extend(limits.no_limit_users.iter().cloned());

        Self {
            policy: LimitPolicy::new(limits.default_limit.clone(), limits.user_limits.clone()),
            no_limit_users: limits.no_limit_users.iter().cloned().collect(),
            no_limit_folders: limits.no_limit_folders.iter().cloned().collect(),
            account_enable_on_day_reset: limits.account_enable_on_day_reset,
            user_timeout: Duration::from_secs(limits.user_timeout_secs),
            backup_path: config.backup.path.clone(),
            configured_user_ids,
        }
    }
}

/// Result of one enforcement step for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// Folders were trimmed down to the exempt ones
    Locked,
    /// The full folder set was written back
    Unlocked,
    /// Folders already matched the desired state
    Unchanged,
    /// The user is not enforced
    UnknownUser,
    /// A folder write was rejected; the next tick retries
    Failed,
    /// The step took longer than the per-user timeout
    TimedOut,
}

/// Outcome for one user within a pass
#[derive(Debug, Clone, Serialize)]
pub struct UserOutcome {
    pub user_id: String,
    pub name: String,
    pub outcome: TickOutcome,
}

/// Summary of a full enforcement pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub day: NaiveDate,
    pub rollover: bool,
    pub outcomes: Vec<UserOutcome>,
}

impl PassReport {
    pub fn count(&self, outcome: TickOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }
}

/// Errors surfaced to callers of the engine's admin operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("user {0} is not subject to limits")]
    UnknownUser(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Decides, per user, whether media folders are locked or unlocked
///
/// A user is locked when today's watch time reaches the altered limit: the
/// enabled folder list is reduced to its exempt folders and the full list is
/// remembered both in memory and in the backup file. Once time is available
/// again (new day, raised limit) the remembered list is written back.
///
/// `tick` and `tick_all` are serialized by one mutex; `refresh` only takes
/// a read snapshot of the runtime state and may run alongside them.
pub struct EnforcementEngine {
    media: Arc<dyn MediaServerClient>,
    stats: Arc<dyn StatsSource>,
    clock: Arc<dyn Clock>,
    policy: LimitPolicy,
    backup: Arc<FolderBackup>,
    account_enable_on_day_reset: bool,
    user_timeout: Duration,
    users: Vec<User>,
    runtime: RwLock<HashMap<String, UserRuntimeState>>,
    day: DayMarker,
    tick_lock: Mutex<()>,
}

impl EnforcementEngine {
    /// Discover users and seed per-user state
    pub async fn initialize(
        settings: EngineSettings,
        media: Arc<dyn MediaServerClient>,
        stats: Arc<dyn StatsSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RemoteError> {
        let all_users = media.list_users().await?;

        for id in &settings.configured_user_ids {
            if !all_users.iter().any(|u| &u.id == id) {
                warn!("Could not find user id <{}> on the media server", id);
            }
        }

        let total = all_users.len();
        let users: Vec<User> = all_users
            .into_iter()
            .filter(|u| !settings.no_limit_users.contains(&u.id))
            .collect();

        let today = clock.today();
        let mut runtime = HashMap::with_capacity(users.len());
        for user in &users {
            let limit = settings.policy.effective_limit(&user.id, today.weekday());
            let folders = media.get_enabled_folders(&user.id).await.unwrap_or_else(|e| {
                warn!("Could not read folders of user {}: {}", user.name, e);
                Vec::new()
            });
            debug!(
                "User {} ({}): {} min today, {} folders enabled",
                user.name,
                user.id,
                limit,
                folders.len()
            );
            runtime.insert(user.id.clone(), UserRuntimeState::new(limit, folders));
        }

        info!("Enforcing limits for {} of {} users", users.len(), total);

        Ok(Self {
            media,
            stats,
            clock,
            policy: settings.policy,
            backup: Arc::new(FolderBackup::new(settings.backup_path, settings.no_limit_folders)),
            account_enable_on_day_reset: settings.account_enable_on_day_reset,
            user_timeout: settings.user_timeout,
            users,
            runtime: RwLock::new(runtime),
            day: DayMarker::new(today),
            tick_lock: Mutex::new(()),
        })
    }

    /// Enforced users, in server order
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.user(user_id).is_some()
    }

    pub fn backup(&self) -> &FolderBackup {
        &self.backup
    }

    /// Day the engine last saw
    pub fn current_day(&self) -> NaiveDate {
        self.day.current()
    }

    /// Consistent copy of one user's runtime state
    pub async fn snapshot(&self, user_id: &str) -> Option<UserRuntimeState> {
        self.runtime.read().await.get(user_id).cloned()
    }

    /// Evaluate lock/unlock for one user
    pub async fn tick(&self, user_id: &str) -> TickOutcome {
        let _serial = self.tick_lock.lock().await;
        self.tick_serialized(user_id).await
    }

    /// Handle day rollover, then evaluate every enforced user in turn
    pub async fn tick_all(&self) -> PassReport {
        let _serial = self.tick_lock.lock().await;

        let rollover = self.detect_rollover();
        if rollover {
            self.reset_all_altered_limits().await;
            self.enable_all_accounts().await;
        }

        let mut outcomes = Vec::with_capacity(self.users.len());
        for user in &self.users {
            let outcome = self.tick_serialized(&user.id).await;
            outcomes.push(UserOutcome {
                user_id: user.id.clone(),
                name: user.name.clone(),
                outcome,
            });
        }

        PassReport {
            day: self.day.current(),
            rollover,
            outcomes,
        }
    }

    /// True exactly once per calendar-day change
    pub fn detect_rollover(&self) -> bool {
        let today = self.clock.today();
        let changed = self.day.advance(today);
        if changed {
            info!("New day {} detected", today);
        }
        changed
    }

    /// Put every altered limit back to today's configured value
    pub async fn reset_all_altered_limits(&self) {
        let weekday = self.clock.today().weekday();
        let mut runtime = self.runtime.write().await;

        for user in &self.users {
            let limit = self.policy.effective_limit(&user.id, weekday);
            if let Some(state) = runtime.get_mut(&user.id) {
                state.reset(limit);
            }
        }

        info!("Reset daily limits for {} users", self.users.len());
    }

    /// Clear the disabled flag of every enforced account, if configured
    ///
    /// Returns how many accounts were re-enabled. A failing account is logged
    /// and skipped.
    pub async fn enable_all_accounts(&self) -> usize {
        if !self.account_enable_on_day_reset {
            return 0;
        }

        let mut enabled = 0;
        for user in &self.users {
            match self.media.set_disabled(&user.id, false).await {
                Ok(()) => enabled += 1,
                Err(e) => warn!("Could not re-enable account {}: {}", user.name, e),
            }
        }

        info!("Re-enabled {} of {} accounts", enabled, self.users.len());
        enabled
    }

    /// Adjust today's limit by `delta` minutes, clamped to `[0, 360]`
    ///
    /// Takes effect on the next tick; callers wanting it immediately tick
    /// the user afterwards.
    pub async fn alter_limit(&self, user_id: &str, delta: i64) -> Result<u32, EngineError> {
        let mut runtime = self.runtime.write().await;
        let state = runtime
            .get_mut(user_id)
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;

        let altered = state.alter(delta);
        info!("Limit of user {} changed by {} to {} min", user_id, delta, altered);
        Ok(altered)
    }

    /// Disable or enable an account on the media server
    pub async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), EngineError> {
        if !self.is_selected(user_id) {
            return Err(EngineError::UnknownUser(user_id.to_string()));
        }

        self.media.set_disabled(user_id, disabled).await?;
        info!(
            "Account {} {}",
            user_id,
            if disabled { "disabled" } else { "enabled" }
        );
        Ok(())
    }

    /// Live disabled flag; unreadable counts as enabled
    pub async fn is_disabled(&self, user_id: &str) -> bool {
        self.media.get_disabled(user_id).await.unwrap_or_else(|e| {
            warn!("Could not read disabled flag of user {}: {}", user_id, e);
            false
        })
    }

    /// Minutes watched today; unreadable counts as nothing watched
    pub async fn watched_minutes(&self, user_id: &str) -> u64 {
        let today = self.clock.today();
        let tomorrow = today.succ_opt().unwrap_or(today);

        match self.stats.total_seconds(user_id, today, tomorrow).await {
            Ok(seconds) => seconds / 60,
            Err(e) if e.is_timeout() => {
                warn!("Usage query for user {} timed out, assuming nothing watched", user_id);
                0
            }
            Err(e) => {
                warn!("No usage recorded for user {}: {}", user_id, e);
                0
            }
        }
    }

    /// Fill `view` with the current figures for `user_id`
    ///
    /// Read-only with respect to folders and the backup file.
    pub async fn refresh(&self, view: &mut ViewState, user_id: &str) -> Result<(), EngineError> {
        let user = self
            .user(user_id)
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;
        let snapshot = self
            .snapshot(user_id)
            .await
            .ok_or_else(|| EngineError::UnknownUser(user_id.to_string()))?;

        if view.user_id.as_deref() != Some(user_id) {
            debug!("View switched to user {}", user.name);
            view.user_id = Some(user_id.to_string());
        }

        let disabled = self.is_disabled(user_id).await;
        let watched = self.watched_minutes(user_id).await;

        view.display_name = user.name.clone();
        view.altered_limit = snapshot.altered_limit;
        view.default_limit = snapshot.effective_limit;
        view.time_watched = watched;
        view.time_left = snapshot.altered_limit as i64 - watched as i64;
        view.disabled = disabled;
        view.progress = progress(watched, snapshot.altered_limit);

        Ok(())
    }

    async fn tick_serialized(&self, user_id: &str) -> TickOutcome {
        if !self.is_selected(user_id) {
            debug!("Ignoring tick for unknown user {}", user_id);
            return TickOutcome::UnknownUser;
        }

        match tokio::time::timeout(self.user_timeout, self.evaluate(user_id)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Enforcement for user {} abandoned after {}s",
                    user_id,
                    self.user_timeout.as_secs()
                );
                TickOutcome::TimedOut
            }
        }
    }

    async fn evaluate(&self, user_id: &str) -> TickOutcome {
        let watched = self.watched_minutes(user_id).await;
        let Some(state) = self.snapshot(user_id).await else {
            return TickOutcome::UnknownUser;
        };
        let time_left = state.altered_limit as i64 - watched as i64;

        // Without a trustworthy folder list no write is safe this cycle
        let observed = match self.media.get_enabled_folders(user_id).await {
            Ok(folders) => folders,
            Err(e) => {
                warn!("Could not read folders of user {}, skipping: {}", user_id, e);
                return TickOutcome::Failed;
            }
        };

        let known_folders = if self.backup.is_trivial(&observed) {
            state.known_folders
        } else {
            self.keep_backup(user_id, &observed).await;
            if let Some(state) = self.runtime.write().await.get_mut(user_id) {
                state.known_folders = observed.clone();
            }
            observed.clone()
        };

        if time_left > 0 {
            self.unlock(user_id, known_folders, &observed).await
        } else {
            self.lock(user_id, &observed).await
        }
    }

    async fn unlock(
        &self,
        user_id: &str,
        known_folders: Vec<String>,
        observed: &[String],
    ) -> TickOutcome {
        let candidate = if self.backup.is_trivial(&known_folders) {
            self.restore_backup(user_id).await
        } else {
            known_folders
        };

        if candidate.is_empty() || candidate.len() <= observed.len() {
            debug!("User {} already has access", user_id);
            return TickOutcome::Unchanged;
        }

        match self.media.set_enabled_folders(user_id, &candidate).await {
            Ok(()) => {
                info!("Restored {} folders for user {}", candidate.len(), user_id);
                TickOutcome::Unlocked
            }
            Err(e) => {
                warn!("Could not restore folders of user {}: {}", user_id, e);
                TickOutcome::Failed
            }
        }
    }

    async fn lock(&self, user_id: &str, observed: &[String]) -> TickOutcome {
        if self.backup.is_trivial(observed) {
            debug!("User {} already locked", user_id);
            return TickOutcome::Unchanged;
        }

        let visible: Vec<String> = observed
            .iter()
            .filter(|f| self.backup.is_exempt(f))
            .cloned()
            .collect();

        match self.media.set_enabled_folders(user_id, &visible).await {
            Ok(()) => {
                info!(
                    "Locked user {}: {} of {} folders stay visible",
                    user_id,
                    visible.len(),
                    observed.len()
                );
                TickOutcome::Locked
            }
            Err(e) => {
                warn!("Could not lock folders of user {}: {}", user_id, e);
                TickOutcome::Failed
            }
        }
    }

    /// File I/O runs on the blocking pool
    async fn keep_backup(&self, user_id: &str, folders: &[String]) {
        let backup = self.backup.clone();
        let user = user_id.to_string();
        let folders = folders.to_vec();

        match tokio::task::spawn_blocking(move || backup.keep(&user, &folders)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Could not back up folders of user {}: {}", user_id, e),
            Err(e) => warn!("Backup of user {} was interrupted: {}", user_id, e),
        }
    }

    async fn restore_backup(&self, user_id: &str) -> Vec<String> {
        let backup = self.backup.clone();
        let user = user_id.to_string();

        tokio::task::spawn_blocking(move || backup.restore(&user))
            .await
            .unwrap_or_else(|e| {
                warn!("Restore of user {} was interrupted: {}", user_id, e);
                Vec::new()
            })
    }
}
