//! Cooperative cancellation between pipeline stages.
//!
//! The pipeline polls a [`CancelCheck`] before starting each full-grid
//! pass. A stage that has started always runs to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{FlowPathError, PipelineError, Stage};

/// Source of cancellation requests.
pub trait CancelCheck {
    /// Whether the caller has asked the computation to stop.
    fn is_cancelled(&self) -> bool;
}

/// A [`CancelCheck`] that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelCheck for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared flag that another thread can raise to cancel a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unraised flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next stage boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl CancelCheck for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Fail with [`FlowPathError::Cancelled`] tagged with `stage` if a
/// cancellation is pending.
pub(crate) fn checkpoint(cancel: &dyn CancelCheck, stage: Stage) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        tracing::info!(%stage, "pipeline cancelled");
        return Err(PipelineError::new(stage, FlowPathError::Cancelled));
    }
    Ok(())
}
