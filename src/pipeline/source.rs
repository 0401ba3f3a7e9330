//! Source loop: pulls items from an [`ItemSource`] and pushes them into the bounded queue.

use anyhow::Result;
use crossbeam_channel::Sender;
use log::debug;
use std::collections::VecDeque;
use std::iter::Map;

use crate::ItemSource;
use crate::error::PipelineError;

use super::cancel::{CancelReason, SendOutcome, send_or_cancel};
use super::context::PipelineContext;

/// Run the source loop until the source is exhausted, the run is cancelled, or the source fails.
///
/// The token is checked before every `next()` so a cancelled run never blocks on the enumerator.
/// `item_tx` is dropped on return; that close is what tells workers the source is exhausted.
/// Returns the number of items placed on the queue.
pub fn run_source_loop<T, S>(
    mut source: S,
    item_tx: Sender<T>,
    ctx: &PipelineContext,
) -> Result<usize, PipelineError>
where
    S: ItemSource<T>,
{
    let mut produced = 0_usize;
    loop {
        if ctx.cancel.is_cancelled() {
            debug!("source: cancelled after {} items", produced);
            break;
        }
        let item = match source.next() {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!("source: exhausted after {} items, closing queue", produced);
                break;
            }
            Err(err) => {
                // Cancel before item_tx drops: workers must not read a failed enumeration as exhaustion.
                ctx.cancel.cancel(CancelReason::Error);
                return Err(PipelineError::Source {
                    produced,
                    source: err,
                });
            }
        };
        match send_or_cancel(&item_tx, item, &ctx.cancel) {
            SendOutcome::Sent => produced += 1,
            SendOutcome::Cancelled(_) => {
                debug!("source: cancelled while queue full after {} items", produced);
                break;
            }
            SendOutcome::Closed(_) => {
                debug!("source: every worker exited, stopping after {} items", produced);
                break;
            }
        }
    }
    drop(item_tx);
    Ok(produced)
}

/// [`ItemSource`] over any iterator of fallible items.
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<T, I> ItemSource<T> for IterSource<I>
where
    I: Iterator<Item = Result<T>>,
{
    fn next(&mut self) -> Result<Option<T>> {
        self.iter.next().transpose()
    }
}

/// Source over items that cannot fail (fixtures, generated keys).
pub type InfallibleSource<I, T> = IterSource<Map<I, fn(T) -> Result<T>>>;

pub fn infallible<T, I>(items: I) -> InfallibleSource<I::IntoIter, T>
where
    I: IntoIterator<Item = T>,
{
    IterSource::new(items.into_iter().map(Ok as fn(T) -> Result<T>))
}

/// One page of a cursor-based listing. `next_cursor: None` marks the last page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// [`ItemSource`] over a paginated enumerator. `fetch(cursor)` is called with `None` for the
/// first page and is only called again once the previous page has been handed out.
pub struct PagedSource<T, F> {
    fetch: F,
    buffered: VecDeque<T>,
    cursor: Option<String>,
    exhausted: bool,
    pages: usize,
}

impl<T, F> PagedSource<T, F>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            buffered: VecDeque::new(),
            cursor: None,
            exhausted: false,
            pages: 0,
        }
    }

    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl<T, F> ItemSource<T> for PagedSource<T, F>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = (self.fetch)(self.cursor.as_deref())?;
            self.pages += 1;
            debug!(
                "source: page {} with {} items (more: {})",
                self.pages,
                page.items.len(),
                page.next_cursor.is_some()
            );
            self.exhausted = page.next_cursor.is_none();
            self.cursor = page.next_cursor;
            self.buffered.extend(page.items);
        }
    }
}
