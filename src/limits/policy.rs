use chrono::{Datelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Minutes per day used when even the configured default is unusable
pub const FALLBACK_LIMIT_MINUTES: u32 = 60;

/// A configured daily limit
///
/// Deserialized untagged so that any YAML value is accepted; shapes other
/// than a number or a 2/7-element list resolve to the default at runtime.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LimitSpec {
    /// Same number of minutes every day
    Minutes(u32),
    /// `[weekday, weekend]` or one value per day starting Monday
    Schedule(Vec<u32>),
    /// Anything else found in the config file
    Invalid(serde_yaml::Value),
}

impl LimitSpec {
    /// Resolve for a weekday, or `None` if the shape is unsupported
    pub fn resolve(&self, weekday: Weekday) -> Option<u32> {
        let index = weekday.num_days_from_monday() as usize;
        match self {
            LimitSpec::Minutes(minutes) => Some(*minutes),
            LimitSpec::Schedule(values) if values.len() == 2 => {
                Some(if index < 5 { values[0] } else { values[1] })
            }
            LimitSpec::Schedule(values) if values.len() == 7 => Some(values[index]),
            _ => None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.resolve(Weekday::Mon).is_some()
    }
}

/// Resolves configured limits into minutes for a given day
#[derive(Debug, Clone)]
pub struct LimitPolicy {
    default: LimitSpec,
    overrides: HashMap<String, LimitSpec>,
}

impl LimitPolicy {
    pub fn new(default: LimitSpec, overrides: HashMap<String, LimitSpec>) -> Self {
        Self { default, overrides }
    }

    /// Resolve a spec, falling back to [`FALLBACK_LIMIT_MINUTES`] on a bad shape
    pub fn resolve(spec: &LimitSpec, weekday: Weekday) -> u32 {
        spec.resolve(weekday).unwrap_or_else(|| {
            warn!(
                "Unsupported limit shape {:?}, using {} minutes",
                spec, FALLBACK_LIMIT_MINUTES
            );
            FALLBACK_LIMIT_MINUTES
        })
    }

    /// Minutes per day the user may watch on `weekday`
    ///
    /// A user override that resolves to 0 (or is malformed) falls back to the
    /// default limit, so a limit of 0 minutes can only be set globally.
    pub fn effective_limit(&self, user_id: &str, weekday: Weekday) -> u32 {
        let default = Self::resolve(&self.default, weekday);

        let Some(spec) = self.overrides.get(user_id) else {
            return default;
        };

        match spec.resolve(weekday) {
            Some(0) => {
                warn!(
                    "Limit for user {} resolves to 0 minutes on {}, using default of {} minutes",
                    user_id, weekday, default
                );
                default
            }
            Some(minutes) => minutes,
            None => {
                warn!(
                    "Limit for user {} has an unsupported shape {:?}, using default of {} minutes",
                    user_id, spec, default
                );
                default
            }
        }
    }

    pub fn default_spec(&self) -> &LimitSpec {
        &self.default
    }

    /// Configured override for a user, if any
    pub fn override_for(&self, user_id: &str) -> Option<&LimitSpec> {
        self.overrides.get(user_id)
    }

    /// User ids that carry an override
    pub fn override_users(&self) -> impl Iterator<Item = &String> {
        self.overrides.keys()
    }
}
