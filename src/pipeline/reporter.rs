//! Result reporter: the single owner of the running total.

use crossbeam_channel::Receiver;
use log::{debug, info};
use std::time::{Duration, Instant};

use crate::CompletionReport;
use crate::error::PipelineError;

use super::cancel::{CancelToken, Received, recv_or_cancel_until};

/// Called with each report's item count (e.g. to advance a progress bar).
pub type ProgressHook = Box<dyn Fn(usize) + Send>;

pub struct ReporterParams {
    pub report_rx: Receiver<CompletionReport>,
    pub log_step: usize,
    pub tick_interval: Option<Duration>,
    pub cancel: CancelToken,
    pub on_progress: Option<ProgressHook>,
}

/// Final state of the reporter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReporterTotals {
    pub total: usize,
    pub reports: usize,
}

/// Sum reports until the channel closes. On cancellation keep receiving without ticks: the
/// channel only closes after every worker has returned, so no committed batch goes unreported.
pub fn run_reporter(params: ReporterParams) -> Result<ReporterTotals, PipelineError> {
    let ReporterParams {
        report_rx,
        log_step,
        tick_interval,
        cancel,
        on_progress,
    } = params;
    let mut totals = ReporterTotals::default();
    let mut next_log = log_step;
    let mut next_tick = tick_interval.map(|d| Instant::now() + d);
    let mut draining = false;

    loop {
        let received = if draining {
            match report_rx.recv() {
                Ok(report) => Received::Item(report),
                Err(_) => Received::Closed,
            }
        } else {
            recv_or_cancel_until(&report_rx, &cancel, next_tick)
        };

        match received {
            Received::Item(report) => {
                totals.total += report.items;
                totals.reports += 1;
                if let Some(ref hook) = on_progress {
                    hook(report.items);
                }
                if log_step > 0 && totals.total >= next_log {
                    info!("count={}", totals.total);
                    next_log = (totals.total / log_step + 1) * log_step;
                }
            }
            Received::TimedOut => {
                info!("tick: count={}", totals.total);
                next_tick = tick_interval.map(|d| Instant::now() + d);
            }
            Received::Cancelled => {
                debug!(
                    "reporter: cancellation observed at count={}, draining",
                    totals.total
                );
                draining = true;
            }
            Received::Closed => {
                info!(
                    "{} items committed in {} batches",
                    totals.total, totals.reports
                );
                return Ok(totals);
            }
        }
    }
}
