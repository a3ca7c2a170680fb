//! In-memory stand-ins for the remote capabilities

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::state::{Clock, User};
use crate::media::{MediaServerClient, RemoteError, StatsSource};

pub(crate) fn folders(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn unavailable(user_id: &str) -> RemoteError {
    RemoteError::Status {
        url: format!("fake://users/{}", user_id),
        status: 503,
    }
}

/// Media server holding folder lists and disabled flags in memory
pub(crate) struct FakeMediaServer {
    users: Vec<User>,
    folders: Mutex<HashMap<String, Vec<String>>>,
    disabled: Mutex<HashMap<String, bool>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_reads: Mutex<HashSet<String>>,
    folder_writes: AtomicUsize,
}

impl FakeMediaServer {
    pub(crate) fn new(users: Vec<(&str, &str, Vec<&str>)>) -> Self {
        let mut folder_map = HashMap::new();
        let mut list = Vec::new();
        for (id, name, enabled) in users {
            list.push(User::new(id, name));
            folder_map.insert(id.to_string(), folders(&enabled));
        }

        Self {
            users: list,
            folders: Mutex::new(folder_map),
            disabled: Mutex::new(HashMap::new()),
            failing_writes: Mutex::new(HashSet::new()),
            failing_reads: Mutex::new(HashSet::new()),
            folder_writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful folder writes so far
    pub(crate) fn write_count(&self) -> usize {
        self.folder_writes.load(Ordering::SeqCst)
    }

    pub(crate) fn folders_of(&self, user_id: &str) -> Vec<String> {
        self.folders
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn disabled_of(&self, user_id: &str) -> bool {
        self.disabled
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(false)
    }

    /// Change the folder list behind the engine's back, as an admin would
    pub(crate) fn set_folders(&self, user_id: &str, enabled: &[&str]) {
        self.folders
            .lock()
            .unwrap()
            .insert(user_id.to_string(), folders(enabled));
    }

    /// Make folder reads for this user fail
    pub(crate) fn fail_reads_for(&self, user_id: &str) {
        self.failing_reads
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    /// Change the flag behind the engine's back
    pub(crate) fn set_disabled_flag(&self, user_id: &str, disabled: bool) {
        self.disabled
            .lock()
            .unwrap()
            .insert(user_id.to_string(), disabled);
    }

    /// Make every write for this user fail
    pub(crate) fn fail_writes_for(&self, user_id: &str) {
        self.failing_writes
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    fn check_write(&self, user_id: &str) -> Result<(), RemoteError> {
        if self.failing_writes.lock().unwrap().contains(user_id) {
            return Err(unavailable(user_id));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaServerClient for FakeMediaServer {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        Ok(self.users.clone())
    }

    async fn get_enabled_folders(&self, user_id: &str) -> Result<Vec<String>, RemoteError> {
        if self.failing_reads.lock().unwrap().contains(user_id) {
            return Err(unavailable(user_id));
        }
        Ok(self.folders_of(user_id))
    }

    async fn get_disabled(&self, user_id: &str) -> Result<bool, RemoteError> {
        Ok(self.disabled_of(user_id))
    }

    async fn set_enabled_folders(
        &self,
        user_id: &str,
        folders: &[String],
    ) -> Result<(), RemoteError> {
        self.check_write(user_id)?;
        self.folders
            .lock()
            .unwrap()
            .insert(user_id.to_string(), folders.to_vec());
        self.folder_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), RemoteError> {
        self.check_write(user_id)?;
        self.set_disabled_flag(user_id, disabled);
        Ok(())
    }
}

/// Statistics backend with fixed per-user totals
#[derive(Default)]
pub(crate) struct FakeStats {
    seconds: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeStats {
    pub(crate) fn set_seconds(&self, user_id: &str, seconds: u64) {
        self.seconds
            .lock()
            .unwrap()
            .insert(user_id.to_string(), seconds);
    }

    pub(crate) fn set_minutes(&self, user_id: &str, minutes: u64) {
        self.set_seconds(user_id, minutes * 60);
    }

    pub(crate) fn fail_for(&self, user_id: &str) {
        self.failing.lock().unwrap().insert(user_id.to_string());
    }

    /// Answer for this user only after `delay`
    pub(crate) fn set_delay(&self, user_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(user_id.to_string(), delay);
    }
}

#[async_trait]
impl StatsSource for FakeStats {
    async fn total_seconds(
        &self,
        user_id: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<u64, RemoteError> {
        let delay = self.delays.lock().unwrap().get(user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(user_id) {
            return Err(unavailable(user_id));
        }

        Ok(self
            .seconds
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }
}

/// Clock that only moves when told to
pub(crate) struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub(crate) fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            today: Mutex::new(NaiveDate::from_ymd_opt(year, month, day).unwrap()),
        }
    }

    pub(crate) fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap();
        *today = *today + chrono::Days::new(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}
