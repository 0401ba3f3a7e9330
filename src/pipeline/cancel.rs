//! Shared cancellation token and the cancellation-aware send/receive used by every pipeline stage.
//!
//! The token wraps a zero-capacity channel whose only sender is dropped on cancel: every thread
//! parked in a `select!` on [`CancelToken::done`] wakes at once, without polling.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Select, SendError, Sender, at, bounded, never, select};
use log::info;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// What triggered cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// A task returned a fatal error (recorded in the error latch).
    Error,
    /// External interrupt (Ctrl+C).
    Interrupt,
    /// Configured deadline elapsed.
    Deadline,
}

struct TokenState {
    trigger: Option<Sender<()>>,
    reason: Option<CancelReason>,
}

struct TokenInner {
    state: Mutex<TokenState>,
    done: Receiver<()>,
}

/// One-shot, clonable cancellation signal shared by source, workers, reporter and supervisor.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded::<()>(0);
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    trigger: Some(trigger),
                    reason: None,
                }),
                done,
            }),
        }
    }

    /// Cancel with `reason`. Returns true only for the call that actually cancelled; the first reason sticks.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.reason.is_some() {
            return false;
        }
        state.reason = Some(reason);
        drop(state.trigger.take());
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reason
    }

    /// Becomes ready (disconnected) once the token is cancelled. For use in `select!`.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }
}

/// Outcome of a cancellation-aware receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    /// Channel empty and every sender dropped.
    Closed,
    Cancelled,
    /// Only from [`recv_or_cancel_until`].
    TimedOut,
}

/// Outcome of a cancellation-aware send. The item is handed back when it was not sent.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome<T> {
    Sent,
    /// Every receiver dropped.
    Closed(T),
    Cancelled(T),
}

/// Block until an item arrives, the channel closes, or the token is cancelled.
/// Cancellation observed before the call wins over a ready item.
pub fn recv_or_cancel<T>(rx: &Receiver<T>, cancel: &CancelToken) -> Received<T> {
    recv_or_cancel_until(rx, cancel, None)
}

/// [`recv_or_cancel`] with an optional wake-up time; returns [`Received::TimedOut`] when it passes.
pub fn recv_or_cancel_until<T>(
    rx: &Receiver<T>,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Received<T> {
    if cancel.is_cancelled() {
        return Received::Cancelled;
    }
    let timeout = deadline.map(at).unwrap_or_else(never);
    select! {
        recv(rx) -> msg => match msg {
            Ok(item) => Received::Item(item),
            // A sender that cancels before dropping must not read as a clean close.
            Err(_) if cancel.is_cancelled() => Received::Cancelled,
            Err(_) => Received::Closed,
        },
        recv(cancel.done()) -> _ => Received::Cancelled,
        recv(timeout) -> _ => Received::TimedOut,
    }
}

/// Block until `item` is accepted by `tx`, every receiver is gone, or the token is cancelled.
/// This is the bounded queue's `put`: it is where backpressure reaches the producer.
pub fn send_or_cancel<T>(tx: &Sender<T>, item: T, cancel: &CancelToken) -> SendOutcome<T> {
    if cancel.is_cancelled() {
        return SendOutcome::Cancelled(item);
    }
    let mut sel = Select::new();
    let send_index = sel.send(tx);
    sel.recv(cancel.done());
    let oper = sel.select();
    if oper.index() == send_index {
        match oper.send(tx, item) {
            Ok(()) => SendOutcome::Sent,
            Err(SendError(item)) => SendOutcome::Closed(item),
        }
    } else {
        let _ = oper.recv(cancel.done());
        SendOutcome::Cancelled(item)
    }
}

/// Map the process interrupt signal onto `cancel`. Can be installed once per process.
pub fn install_interrupt_handler(cancel: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.cancel(CancelReason::Interrupt) {
            info!("Received interrupt; draining in-flight batches...");
        }
    })
    .context("set Ctrl+C handler")
}
