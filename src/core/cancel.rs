//! Cooperative cancellation for long-running analysis phases.

use crate::core::errors::{AnalysisError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Workers poll the token at phase boundaries and every
/// [`CANCEL_POLL_INTERVAL`] inner iterations of long algorithms.
pub const CANCEL_POLL_INTERVAL: usize = 1024;

/// Shared cancellation flag handed to `analyze_with_cancel`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Error out of the current phase if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}
