use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Hard ceiling for a manually adjusted daily limit (minutes)
pub const MAX_ALTERED_LIMIT: u32 = 360;

/// An account on the media server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Engine-owned runtime state for one enforced user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRuntimeState {
    /// Today's limit as configured
    pub effective_limit: u32,
    /// Today's limit after manual adjustments
    pub altered_limit: u32,
    /// Last full folder set seen before a lock
    pub known_folders: Vec<String>,
}

impl UserRuntimeState {
    pub fn new(effective_limit: u32, known_folders: Vec<String>) -> Self {
        Self {
            effective_limit,
            altered_limit: effective_limit,
            known_folders,
        }
    }

    /// Shift the altered limit by `delta` minutes, clamped to `[0, MAX_ALTERED_LIMIT]`
    pub fn alter(&mut self, delta: i64) -> u32 {
        let altered = (self.altered_limit as i64)
            .saturating_add(delta)
            .clamp(0, MAX_ALTERED_LIMIT as i64);
        self.altered_limit = altered as u32;
        self.altered_limit
    }

    /// Start a new day with a freshly resolved limit
    pub fn reset(&mut self, effective_limit: u32) {
        self.effective_limit = effective_limit;
        self.altered_limit = effective_limit;
    }
}

/// Last calendar day the engine observed
#[derive(Debug)]
pub struct DayMarker {
    day: Mutex<NaiveDate>,
}

impl DayMarker {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: Mutex::new(day),
        }
    }

    pub fn current(&self) -> NaiveDate {
        *self.day.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the marker to `today`; true only when the day changed
    pub fn advance(&self, today: NaiveDate) -> bool {
        let mut day = self.day.lock().unwrap_or_else(|e| e.into_inner());
        if *day == today {
            return false;
        }
        *day = today;
        true
    }
}

/// Source of "today" for the engine
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Format a date the way the usage backends expect it
pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_new_state_starts_unaltered() {
        let state = UserRuntimeState::new(90, vec!["movies".to_string()]);
        assert_eq!(state.effective_limit, 90);
        assert_eq!(state.altered_limit, 90);
    }

    #[test]
    fn test_alter_clamps_at_upper_bound() {
        let mut state = UserRuntimeState::new(300, vec![]);
        assert_eq!(state.alter(1000), 360);
        assert_eq!(state.altered_limit, 360);
    }

    #[test]
    fn test_alter_clamps_at_zero() {
        let mut state = UserRuntimeState::new(50, vec![]);
        assert_eq!(state.alter(-1000), 0);
    }

    #[test]
    fn test_alter_saturates_on_extreme_deltas() {
        let mut state = UserRuntimeState::new(60, vec![]);
        assert_eq!(state.alter(i64::MAX), MAX_ALTERED_LIMIT);
        assert_eq!(state.alter(i64::MIN), 0);
    }

    #[test]
    fn test_alter_within_range() {
        let mut state = UserRuntimeState::new(60, vec![]);
        assert_eq!(state.alter(30), 90);
        assert_eq!(state.alter(-5), 85);
        assert_eq!(state.effective_limit, 60);
    }

    #[test]
    fn test_reset_restores_effective_limit() {
        let mut state = UserRuntimeState::new(60, vec![]);
        state.alter(45);
        state.reset(120);
        assert_eq!(state.effective_limit, 120);
        assert_eq!(state.altered_limit, 120);
    }

    #[test]
    fn test_day_marker_reports_change_once() {
        let marker = DayMarker::new(day(1));
        assert!(!marker.advance(day(1)));
        assert!(marker.advance(day(2)));
        assert!(!marker.advance(day(2)));
        assert_eq!(marker.current(), day(2));
    }

    #[test]
    fn test_format_day() {
        assert_eq!(format_day(day(9)), "2025-03-09");
    }
}
