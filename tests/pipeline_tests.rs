//! Pipeline tests: totals, batch sizes, failure, cancellation, backpressure.

use anyhow::{Result, bail};
use batchflow::pipeline::{Page, PagedSource, infallible};
use batchflow::{
    CancelReason, ItemSource, PipelineConfig, PipelineError, RemoteBatchOperation, StopReason,
    Supervisor, run_batches,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Remote operation that records every batch it commits and can fail or panic on a given call.
#[derive(Default)]
struct Recorder {
    calls: AtomicUsize,
    committed: Mutex<Vec<Vec<u64>>>,
    fail_on_call: Option<usize>,
    panic_on_call: Option<usize>,
    latency: Option<Duration>,
}

impl Recorder {
    fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    fn sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self
            .committed
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.len())
            .collect();
        sizes.sort_unstable();
        sizes
    }

    fn items(&self) -> Vec<u64> {
        self.committed
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect()
    }
}

/// Handle passed to the pipeline; the test keeps its own `Arc` to inspect what was committed.
struct RecordingOp(Arc<Recorder>);

fn op(rec: &Arc<Recorder>) -> RecordingOp {
    RecordingOp(Arc::clone(rec))
}

impl RemoteBatchOperation<u64> for RecordingOp {
    fn apply(&self, batch: &[u64]) -> Result<()> {
        let this = &self.0;
        let call = this.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = this.latency {
            thread::sleep(latency);
        }
        if this.panic_on_call == Some(call) {
            panic!("backend exploded on call {call}");
        }
        if this.fail_on_call == Some(call) {
            bail!("backend rejected call {call}");
        }
        this.committed.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

fn config(workers: usize, batch_size: usize, queue_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        batch_size,
        queue_capacity,
        log_step: 0,
        tick_interval: None,
        ..Default::default()
    }
}

/// Unbounded counting source; increments `pulled` on every `next()`.
struct Endless {
    next: u64,
    pulled: Arc<AtomicUsize>,
}

impl ItemSource<u64> for Endless {
    fn next(&mut self) -> Result<Option<u64>> {
        self.pulled.fetch_add(1, Ordering::SeqCst);
        self.next += 1;
        Ok(Some(self.next))
    }
}

// --- clean runs ---

#[test]
fn test_total_equals_items_across_workers_and_batch_sizes() {
    const N: u64 = 257;
    for workers in [1, 3, 8, 64] {
        for batch_size in [1, 10, 256, 257] {
            let rec = Arc::new(Recorder::default());
            let summary = run_batches(
                infallible(0..N),
                op(&rec),
                &config(workers, batch_size, 16),
            )
            .unwrap();
            assert_eq!(summary.stop, StopReason::Completed);
            assert_eq!(summary.committed, N as usize, "w={workers} b={batch_size}");
            assert_eq!(summary.produced, N as usize);
            assert_eq!(summary.dequeued, N as usize);
            assert!(rec.sizes().iter().all(|&s| s > 0 && s <= batch_size));
            let seen: HashSet<u64> = rec.items().into_iter().collect();
            assert_eq!(seen.len(), N as usize);
        }
    }
}

#[test]
fn test_1200_items_batch_500_eight_workers() {
    let rec = Arc::new(Recorder::default());
    let summary = run_batches(
        infallible(0..1200u64),
        op(&rec),
        &config(8, 500, 500),
    )
    .unwrap();
    assert_eq!(rec.sizes(), vec![200, 500, 500]);
    assert_eq!(summary.committed, 1200);
    assert_eq!(summary.batches, 3);
}

#[test]
fn test_final_partial_batch_flushed_once() {
    let rec = Arc::new(Recorder::default());
    let summary = run_batches(infallible(0..23u64), op(&rec), &config(4, 5, 2)).unwrap();
    assert_eq!(rec.sizes(), vec![3, 5, 5, 5, 5]);
    assert_eq!(summary.batches, 5);
    assert_eq!(rec.calls.load(Ordering::SeqCst), 5);
}

#[test]
fn test_empty_source_makes_no_calls() {
    let rec = Arc::new(Recorder::default());
    let summary = run_batches(
        infallible(Vec::<u64>::new()),
        op(&rec),
        &config(4, 10, 4),
    )
    .unwrap();
    assert_eq!(summary.committed, 0);
    assert_eq!(summary.stop, StopReason::Completed);
    assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_disjoint_runs_never_overlap() {
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    run_batches(infallible(0..500u64), op(&first), &config(8, 7, 8)).unwrap();
    run_batches(infallible(500..1000u64), op(&second), &config(8, 7, 8)).unwrap();

    let a = first.items();
    let b = second.items();
    let a_set: HashSet<u64> = a.iter().copied().collect();
    let b_set: HashSet<u64> = b.iter().copied().collect();
    assert_eq!(a.len(), a_set.len());
    assert_eq!(b.len(), b_set.len());
    assert!(a_set.is_disjoint(&b_set));
    assert_eq!(a_set.len() + b_set.len(), 1000);
}

#[test]
fn test_closure_as_remote_operation() {
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_op = Arc::clone(&seen);
    let count = move |batch: &[u64]| -> Result<()> {
        seen_op.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    };
    let summary = run_batches(infallible(0..99u64), count, &config(2, 10, 10)).unwrap();
    assert_eq!(summary.committed, 99);
    assert_eq!(seen.load(Ordering::SeqCst), 99);
}

// --- failures ---

#[test]
fn test_first_call_fails_small_source() {
    let rec = Arc::new(Recorder::failing_on(1));
    let failure = run_batches(
        infallible(0..10u64),
        op(&rec),
        &config(8, 500, 500),
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        PipelineError::RemoteOperation { batch_len: 10, .. }
    ));
    assert_eq!(failure.summary.committed, 0);
    assert_eq!(failure.summary.stop, StopReason::Failed);
}

#[test]
fn test_kth_call_fails_counts_only_committed_batches() {
    let rec = Arc::new(Recorder {
        fail_on_call: Some(3),
        latency: Some(Duration::from_millis(2)),
        ..Default::default()
    });
    let failure = run_batches(
        infallible(0..10_000u64),
        op(&rec),
        &config(4, 10, 20),
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        PipelineError::RemoteOperation { .. }
    ));
    let committed_items = rec.items();
    let unique: HashSet<u64> = committed_items.iter().copied().collect();
    assert_eq!(unique.len(), committed_items.len());
    assert_eq!(failure.summary.committed, committed_items.len());
    assert!(failure.summary.committed <= failure.summary.dequeued);
    assert!(failure.summary.dequeued <= failure.summary.produced);
    assert!(failure.summary.produced < 10_000);
}

#[test]
fn test_failed_worker_still_counts_dequeued_items() {
    let rec = Arc::new(Recorder::failing_on(2));
    let failure = run_batches(infallible(0..6u64), op(&rec), &config(1, 2, 8)).unwrap_err();
    assert!(matches!(
        failure.error,
        PipelineError::RemoteOperation { batch_len: 2, .. }
    ));
    let summary = failure.summary;
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.batches, 1);
    // First batch committed, second taken off the queue and rejected.
    assert_eq!(summary.dequeued, 4);
    assert_eq!(summary.produced, 6);
}

#[test]
fn test_panicked_worker_still_counts_dequeued_items() {
    let rec = Arc::new(Recorder {
        panic_on_call: Some(3),
        ..Default::default()
    });
    let failure = run_batches(infallible(0..10u64), op(&rec), &config(1, 3, 16)).unwrap_err();
    assert!(matches!(failure.error, PipelineError::Panicked { .. }));
    assert_eq!(failure.summary.committed, 6);
    assert_eq!(failure.summary.dequeued, 9);
    assert!(failure.summary.dequeued <= failure.summary.produced);
}

#[test]
fn test_source_error_surfaces_and_stops() {
    let source = PagedSource::new(|cursor: Option<&str>| -> Result<Page<u64>> {
        match cursor {
            None => Ok(Page {
                items: (0..5).collect(),
                next_cursor: Some("p2".into()),
            }),
            Some("p2") => Ok(Page {
                items: (5..10).collect(),
                next_cursor: Some("p3".into()),
            }),
            Some(_) => bail!("listing backend unavailable"),
        }
    });
    let rec = Arc::new(Recorder::default());
    let failure = run_batches(source, op(&rec), &config(2, 100, 100)).unwrap_err();
    match failure.error {
        PipelineError::Source { produced, .. } => assert_eq!(produced, 10),
        other => panic!("unexpected error: {other}"),
    }
    // A failed listing is not exhaustion: the partial batch must not be flushed.
    assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
    assert_eq!(failure.summary.committed, 0);
}

#[test]
fn test_panicking_operation_is_reported() {
    let rec = Arc::new(Recorder {
        panic_on_call: Some(2),
        ..Default::default()
    });
    let failure = run_batches(
        infallible(0..1000u64),
        op(&rec),
        &config(2, 10, 10),
    )
    .unwrap_err();
    assert!(matches!(failure.error, PipelineError::Panicked { .. }));
    assert_eq!(failure.summary.committed, rec.items().len());
}

#[test]
fn test_invalid_config_rejected() {
    let rec = Arc::new(Recorder::default());
    let failure = run_batches(infallible(0..10u64), op(&rec), &config(0, 10, 10)).unwrap_err();
    assert!(matches!(failure.error, PipelineError::InvalidConfig(_)));
}

// --- reporter ---

#[test]
fn test_progress_hook_sees_every_committed_item() {
    let seen = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (seen_hook, calls_hook) = (Arc::clone(&seen), Arc::clone(&calls));
    let supervisor = Supervisor::new(config(3, 7, 8))
        .unwrap()
        .with_progress(Box::new(move |n: usize| {
            seen_hook.fetch_add(n, Ordering::SeqCst);
            calls_hook.fetch_add(1, Ordering::SeqCst);
        }));
    let rec = Arc::new(Recorder::default());
    let summary = supervisor.run_batches(infallible(0..100u64), op(&rec)).unwrap();
    assert_eq!(summary.committed, 100);
    assert_eq!(seen.load(Ordering::SeqCst), summary.committed);
    assert_eq!(calls.load(Ordering::SeqCst), summary.batches);
}

#[test]
fn test_reporter_total_survives_ticks_and_log_steps() {
    let rec = Arc::new(Recorder {
        latency: Some(Duration::from_millis(3)),
        ..Default::default()
    });
    let cfg = PipelineConfig {
        log_step: 7,
        tick_interval: Some(Duration::from_millis(2)),
        ..config(2, 5, 4)
    };
    let summary = run_batches(infallible(0..200u64), op(&rec), &cfg).unwrap();
    assert_eq!(summary.stop, StopReason::Completed);
    assert_eq!(summary.committed, 200);
    assert_eq!(summary.batches, 40);
}

// --- cancellation ---

#[test]
fn test_interrupt_drains_and_keeps_committed_count() {
    let rec = Arc::new(Recorder {
        latency: Some(Duration::from_millis(1)),
        ..Default::default()
    });
    let supervisor = Supervisor::new(config(4, 8, 16)).unwrap();
    let token = supervisor.cancel_token();
    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel(CancelReason::Interrupt)
    });
    let source = Endless {
        next: 0,
        pulled: Arc::new(AtomicUsize::new(0)),
    };
    let summary = supervisor.run_batches(source, op(&rec)).unwrap();
    assert!(interrupter.join().unwrap());
    assert_eq!(summary.stop, StopReason::Interrupted);
    assert_eq!(summary.committed, rec.items().len());
    assert!(summary.committed <= summary.dequeued);
}

#[test]
fn test_deadline_stops_endless_source() {
    let rec = Arc::new(Recorder::default());
    let cfg = PipelineConfig {
        deadline: Some(Duration::from_millis(50)),
        ..config(2, 10, 10)
    };
    let source = Endless {
        next: 0,
        pulled: Arc::new(AtomicUsize::new(0)),
    };
    let summary = run_batches(source, op(&rec), &cfg).unwrap();
    assert_eq!(summary.stop, StopReason::DeadlineReached);
    assert_eq!(summary.committed, rec.items().len());
}

#[test]
fn test_error_after_interrupt_still_fails_run() {
    let supervisor = Supervisor::new(config(1, 5, 5)).unwrap();
    let token = supervisor.cancel_token();
    let reject = move |_: &[u64]| -> Result<()> {
        token.cancel(CancelReason::Interrupt);
        bail!("rejected after interrupt")
    };
    let failure = supervisor.run_batches(infallible(0..100u64), reject).unwrap_err();
    assert!(matches!(failure.error, PipelineError::RemoteOperation { .. }));
    assert_eq!(failure.summary.stop, StopReason::Failed);
}

// --- backpressure ---

#[test]
fn test_source_blocks_when_queue_full() {
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let gated = move |_: &[u64]| -> Result<()> {
        // Blocks until the test drops release_tx.
        let _ = release_rx.recv();
        Ok(())
    };
    let pulled = Arc::new(AtomicUsize::new(0));
    let source = Endless {
        next: 0,
        pulled: Arc::clone(&pulled),
    };
    let supervisor = Supervisor::new(config(1, 1, 4)).unwrap();
    let token = supervisor.cancel_token();
    let run = thread::spawn(move || supervisor.run_batches(source, gated));

    thread::sleep(Duration::from_millis(200));
    // One item in the blocked flush, four in the queue, one held by the blocked send.
    let pulled_while_blocked = pulled.load(Ordering::SeqCst);
    assert!(pulled_while_blocked <= 6, "pulled {pulled_while_blocked}");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pulled.load(Ordering::SeqCst), pulled_while_blocked);

    token.cancel(CancelReason::Interrupt);
    drop(release_tx);
    let summary = run.join().unwrap().unwrap();
    assert_eq!(summary.stop, StopReason::Interrupted);
    assert_eq!(summary.committed, 1);
}
