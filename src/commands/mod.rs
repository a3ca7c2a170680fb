pub mod utils;
pub mod watchdog;

pub use watchdog::{check_config, run, status, trigger, users};
