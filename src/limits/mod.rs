/// Daily watch-time limit enforcement
///
/// This module provides functionality to:
/// - Resolve per-user limits that may vary by day of week
/// - Lock media folders once a user's daily allowance is used up
/// - Remember and restore each user's full folder set across lock cycles
/// - Reset adjusted limits when a new day starts

pub mod backup;
pub mod engine;
pub mod policy;
pub mod state;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineError, EngineSettings, EnforcementEngine, PassReport, TickOutcome};
pub use policy::{FALLBACK_LIMIT_MINUTES, LimitPolicy, LimitSpec};
pub use state::{SystemClock, User, format_day};
pub use view::ViewState;
