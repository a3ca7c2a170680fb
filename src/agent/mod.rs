// Agent module: keeps the engine running
//
// A timer drives periodic enforcement passes while an HTTP listener accepts
// external triggers, dashboard views and admin changes.

mod daemon;
mod http;
mod scheduler;

pub use daemon::{build_engine, run_pass_once, run_watchdog};
pub use scheduler::PollingScheduler;
