//! Resumable page-by-page fetch into an in-memory accumulator.
//!
//! ```text
//! Idle → FetchingPage → (AccumulatingResults → FetchingPage)* → Done | Cancelled | Error
//! ```
//!
//! Exactly one page request is outstanding at a time. A stop preserves the
//! cursor of the next unfetched page, so calling [`PagedFetch::run`] again
//! with a fresh token picks up where the previous run left off. Failures are
//! never retried here; running again after an error starts over from the
//! first page.

use std::future::Future;

use bulkops_core::PageCursor;

use crate::cancel::StopToken;

/// One page of results plus the cursor for the page after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
}

/// A paged list endpoint.
pub trait PageSource<T> {
    type Error: std::fmt::Display;

    /// Fetches the page at `cursor`, or the first page when `cursor` is `None`.
    fn fetch_page(
        &self,
        cursor: Option<&PageCursor>,
    ) -> impl Future<Output = Result<Page<T>, Self::Error>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    FetchingPage,
    AccumulatingResults,
    Done,
    Cancelled,
    Error,
}

impl std::fmt::Display for FetchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchState::Idle => write!(f, "idle"),
            FetchState::FetchingPage => write!(f, "fetching_page"),
            FetchState::AccumulatingResults => write!(f, "accumulating_results"),
            FetchState::Done => write!(f, "done"),
            FetchState::Cancelled => write!(f, "cancelled"),
            FetchState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PagedFetch<T> {
    items: Vec<T>,
    start: Option<PageCursor>,
    cursor: Option<PageCursor>,
    pages_fetched: usize,
    max_pages: usize,
    ceiling_reached: bool,
    state: FetchState,
}

impl<T> PagedFetch<T> {
    /// Starts from the first page. `max_pages` is raised to at least 1.
    #[must_use]
    pub fn new(max_pages: usize) -> Self {
        Self::starting_at(None, max_pages)
    }

    /// Starts from `cursor`, e.g. one printed by an earlier stopped run.
    #[must_use]
    pub fn starting_at(cursor: Option<PageCursor>, max_pages: usize) -> Self {
        Self {
            items: Vec::new(),
            start: cursor.clone(),
            cursor,
            pages_fetched: 0,
            max_pages: max_pages.max(1),
            ceiling_reached: false,
            state: FetchState::Idle,
        }
    }

    /// Drives the loop until there are no more pages, the ceiling is
    /// reached, `token` is stopped, or a page fails.
    ///
    /// # Errors
    ///
    /// Returns the source's error when a page request fails. Items from
    /// earlier pages stay in the accumulator and the state becomes
    /// [`FetchState::Error`].
    pub async fn run<S>(&mut self, source: &S, token: &StopToken) -> Result<FetchState, S::Error>
    where
        S: PageSource<T>,
    {
        match self.state {
            FetchState::Done => return Ok(FetchState::Done),
            FetchState::Error => self.restart(),
            _ => {}
        }

        loop {
            if token.is_stopped() {
                self.state = FetchState::Cancelled;
                tracing::info!(
                    pages_fetched = self.pages_fetched,
                    items = self.items.len(),
                    resume_cursor = ?self.cursor.as_ref().map(PageCursor::as_str),
                    "paged fetch stopped"
                );
                return Ok(FetchState::Cancelled);
            }

            self.state = FetchState::FetchingPage;
            let page = match source.fetch_page(self.cursor.as_ref()).await {
                Ok(page) => page,
                Err(err) => {
                    self.state = FetchState::Error;
                    tracing::warn!(
                        pages_fetched = self.pages_fetched,
                        error = %err,
                        "page fetch failed"
                    );
                    return Err(err);
                }
            };

            self.state = FetchState::AccumulatingResults;
            self.pages_fetched += 1;
            tracing::debug!(
                page = self.pages_fetched,
                page_items = page.items.len(),
                has_next = page.next.is_some(),
                "page fetched"
            );
            self.items.extend(page.items);
            self.cursor = page.next;

            if self.cursor.is_none() {
                self.state = FetchState::Done;
                return Ok(FetchState::Done);
            }

            if self.pages_fetched >= self.max_pages {
                self.ceiling_reached = true;
                self.state = FetchState::Done;
                tracing::warn!(
                    max_pages = self.max_pages,
                    items = self.items.len(),
                    "page ceiling reached; remaining pages skipped"
                );
                return Ok(FetchState::Done);
            }
        }
    }

    fn restart(&mut self) {
        self.items.clear();
        self.cursor = self.start.clone();
        self.pages_fetched = 0;
        self.ceiling_reached = false;
        self.state = FetchState::Idle;
    }

    #[must_use]
    pub fn state(&self) -> FetchState {
        self.state
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Cursor of the next unfetched page; `None` once the last page arrived.
    #[must_use]
    pub fn resume_cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    #[must_use]
    pub fn ceiling_reached(&self) -> bool {
        self.ceiling_reached
    }
}
