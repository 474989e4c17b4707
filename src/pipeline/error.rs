//! Failure reporting for periodic runs.

use crate::error::MeterError;

/// Trait for reporting per-iteration failures.
pub trait ErrorReporter: Send + Sync {
    /// Report a failure that did not stop the loop.
    fn report(&self, iteration: u64, error: &MeterError);
}

/// Reporter that logs through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, iteration: u64, error: &MeterError) {
        log::warn!("[{}] iteration {} failed: {}", error.stage(), iteration, error);
    }
}
