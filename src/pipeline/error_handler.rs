use log::{debug, error};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::PipelineError;

use super::cancel::{CancelReason, CancelToken};

/// One-shot first-error latch. Recording the first error cancels the shared token;
/// later errors are logged at debug and dropped. Read once by the supervisor after the drain.
#[derive(Clone)]
pub struct ErrorLatch {
    first_error: Arc<Mutex<Option<PipelineError>>>,
    cancel: CancelToken,
}

impl ErrorLatch {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            first_error: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    /// Returns true if `err` was the first error of the run.
    pub fn record(&self, err: PipelineError) -> bool {
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!("discarding later error: {}", err);
            return false;
        }
        error!("{}", err);
        *slot = Some(err);
        drop(slot);
        self.cancel.cancel(CancelReason::Error);
        true
    }

    pub fn is_set(&self) -> bool {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn take(&self) -> Option<PipelineError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
