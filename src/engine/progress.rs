//! Progress counter driven by the reporter.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::pipeline::ProgressHook;

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Counter for an unknown total (shows count and rate, no percentage).
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " items"
    )))
}

/// Update progress bar if available.
/// try_lock: the reporter must never wait on the terminal.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Final refresh so the last count is on screen.
pub fn finish_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
        eprintln!();
    }
}

/// Reporter hook that advances `bar` by each report's item count.
pub fn progress_hook(bar: &ProgressBar) -> ProgressHook {
    let bar = Arc::clone(bar);
    Box::new(move |n: usize| update_progress_bar(&bar, n))
}
