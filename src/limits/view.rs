use serde::Serialize;

/// What one dashboard session is currently showing
///
/// Sessions only remember which user they track; every figure is copied in
/// from the engine on refresh, so a session never holds backup or folder
/// data of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub user_id: Option<String>,
    pub display_name: String,
    pub altered_limit: u32,
    pub default_limit: u32,
    pub time_watched: u64,
    pub time_left: i64,
    pub disabled: bool,
    pub progress: f64,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tracked user still has time left today
    pub fn has_time_left(&self) -> bool {
        self.time_left > 0
    }

    /// One-line human summary, used by the CLI
    pub fn summary(&self) -> String {
        let remaining = if self.has_time_left() {
            format!("{} min left", self.time_left)
        } else {
            format!("exceeded by {} min", -self.time_left)
        };

        format!(
            "{}: watched {} of {} min (default {}), {}, account {}",
            self.display_name,
            self.time_watched,
            self.altered_limit,
            self.default_limit,
            remaining,
            if self.disabled { "disabled" } else { "enabled" }
        )
    }
}

/// Fraction of today's allowance already used, within `[0, 1]`
pub fn progress(watched: u64, altered_limit: u32) -> f64 {
    if altered_limit == 0 {
        return 1.0;
    }
    (watched as f64 / altered_limit as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bounds() {
        assert_eq!(progress(0, 60), 0.0);
        assert_eq!(progress(30, 60), 0.5);
        assert_eq!(progress(90, 60), 1.0);
        assert_eq!(progress(0, 0), 1.0);
    }

    #[test]
    fn test_summary_mentions_overrun() {
        let view = ViewState {
            display_name: "Alice".to_string(),
            altered_limit: 60,
            default_limit: 60,
            time_watched: 75,
            time_left: -15,
            ..ViewState::new()
        };
        assert!(!view.has_time_left());
        assert!(view.summary().contains("exceeded by 15 min"));
    }
}
