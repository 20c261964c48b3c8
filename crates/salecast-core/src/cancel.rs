//! Cooperative cancellation of a pipeline run.

use crate::error::{ForecastError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag.
///
/// Clones observe the same flag. Estimators poll it inside their optimizer
/// loop and the pipeline polls it between stages, so a run stops within one
/// objective evaluation of [`CancelFlag::cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ForecastError::Cancelled)
        } else {
            Ok(())
        }
    }
}
