//! `Monitor` (spec.md §4.6, §6): the log sink the builder is wired with.
//! A thin facade over `tracing`, matching the teacher's convention of
//! naming a log destination rather than calling `tracing` macros
//! directly from every call site.

use tracing::{error, info};

pub trait Monitor: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default `Monitor` backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn info(&self, message: &str) {
        info!(target: "transfer_process_manager", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "transfer_process_manager", "{message}");
    }
}
