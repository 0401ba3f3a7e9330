//! Task groups: named threads whose errors and panics feed the shared first-error latch.

use log::debug;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crate::error::PipelineError;

use super::error_handler::ErrorLatch;

/// A set of threads joined together. A task that returns `Err` or panics records into the latch
/// (which cancels the run) and contributes no output to [`TaskGroup::wait`].
pub struct TaskGroup<T> {
    name: &'static str,
    errors: ErrorLatch,
    handles: Vec<(String, JoinHandle<Option<T>>)>,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(name: &'static str, errors: ErrorLatch) -> Self {
        Self {
            name,
            errors,
            handles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Spawn `f` on a named thread.
    pub fn spawn<F>(&mut self, task: impl Into<String>, f: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    {
        let task = task.into();
        let errors = self.errors.clone();
        let label = task.clone();
        let handle = thread::Builder::new()
            .name(task.clone())
            .spawn(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(Ok(output)) => Some(output),
                Ok(Err(err)) => {
                    errors.record(err);
                    None
                }
                Err(payload) => {
                    errors.record(PipelineError::Panicked {
                        task: label,
                        message: panic_message(payload.as_ref()),
                    });
                    None
                }
            })
            .map_err(|source| PipelineError::Spawn {
                task: task.clone(),
                source,
            })?;
        self.handles.push((task, handle));
        Ok(())
    }

    /// Join every task in spawn order; returns the outputs of tasks that succeeded.
    pub fn wait(self) -> Vec<T> {
        let total = self.handles.len();
        let outputs: Vec<T> = self
            .handles
            .into_iter()
            .filter_map(|(task, handle)| match handle.join() {
                Ok(output) => output,
                Err(payload) => {
                    self.errors.record(PipelineError::Panicked {
                        task,
                        message: panic_message(payload.as_ref()),
                    });
                    None
                }
            })
            .collect();
        debug!(
            "{} group: {}/{} tasks finished cleanly",
            self.name,
            outputs.len(),
            total
        );
        outputs
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
