//! Per-session ordered event log.

mod log;

pub use log::{EventLog, LogError};
