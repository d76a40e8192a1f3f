//! Sequential traversal of paged catalog listings.
//!
//! Pages are visited 1, 2, 3, ... and never skipped or reordered. The walk
//! stops on the first of: a missing page, a page that adds nothing new, the
//! record limit, the page ceiling, or a page that fails after retries.

use std::collections::HashSet;
use std::future::Future;

use crate::error::AppError;
use crate::fetch::{Page, PageFetcher};
use crate::traits::SessionFactory;

/// Anything that can produce listing page `n` (1-based).
pub trait PageSource: Send {
    fn fetch_page(&mut self, page: u32) -> impl Future<Output = Result<Page, AppError>> + Send;
}

/// A paged listing served through a worker's [`PageFetcher`].
pub struct Listing<'a, F: SessionFactory, U> {
    fetcher: &'a mut PageFetcher<F>,
    url_for: U,
}

impl<'a, F, U> Listing<'a, F, U>
where
    F: SessionFactory,
    U: Fn(u32) -> String + Send,
{
    pub fn new(fetcher: &'a mut PageFetcher<F>, url_for: U) -> Self {
        Self { fetcher, url_for }
    }
}

impl<F, U> PageSource for Listing<'_, F, U>
where
    F: SessionFactory,
    U: Fn(u32) -> String + Send,
{
    async fn fetch_page(&mut self, page: u32) -> Result<Page, AppError> {
        let url = (self.url_for)(page);
        tracing::debug!(worker = %self.fetcher.worker_id(), page, %url, "Fetching listing page");
        self.fetcher.fetch(&url).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub max_records: usize,
    pub max_pages: u32,
}

/// Why a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NotFound,
    NoNewRecords,
    LimitReached,
    PageCeiling,
    PageFailed,
}

#[derive(Debug)]
pub struct Pagination<T> {
    /// Unique by key, in extraction order, concatenated by page.
    pub records: Vec<T>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
    /// Set when `stop_reason` is `PageFailed`.
    pub error: Option<AppError>,
}

impl<T> Pagination<T> {
    fn stop(records: Vec<T>, pages_fetched: u32, stop_reason: StopReason) -> Self {
        Self {
            records,
            pages_fetched,
            stop_reason,
            error: None,
        }
    }
}

/// Walk a listing, extracting records from every page and deduplicating them
/// by `key`. Never returns more than `limits.max_records` records.
pub async fn paginate<S, T, X, K>(
    source: &mut S,
    limits: PageLimits,
    extract: X,
    key: K,
) -> Pagination<T>
where
    S: PageSource,
    X: Fn(&str) -> Vec<Result<T, AppError>>,
    K: Fn(&T) -> String,
{
    let mut records = Vec::new();
    if limits.max_records == 0 {
        return Pagination::stop(records, 0, StopReason::LimitReached);
    }

    let mut seen = HashSet::new();
    let mut pages_fetched = 0u32;
    let mut page = 1u32;

    loop {
        if page > limits.max_pages {
            tracing::warn!(max_pages = limits.max_pages, "Page ceiling reached");
            return Pagination::stop(records, pages_fetched, StopReason::PageCeiling);
        }

        let fetched = source.fetch_page(page).await;
        pages_fetched += 1;

        let html = match fetched {
            Ok(Page::Document(html)) => html,
            Ok(Page::NotFound) => {
                tracing::debug!(page, "Listing page not found, end of listing");
                return Pagination::stop(records, pages_fetched, StopReason::NotFound);
            }
            Err(e) => {
                tracing::warn!(page, error = %e, kept = records.len(), "Listing page failed");
                return Pagination {
                    records,
                    pages_fetched,
                    stop_reason: StopReason::PageFailed,
                    error: Some(e),
                };
            }
        };

        let mut added = 0usize;
        for candidate in extract(&html) {
            let record = match candidate {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(page, error = %e, "Skipping unparseable record");
                    continue;
                }
            };
            if seen.insert(key(&record)) {
                records.push(record);
                added += 1;
                if records.len() >= limits.max_records {
                    break;
                }
            }
        }

        tracing::debug!(page, added, total = records.len(), "Listing page processed");

        if added == 0 {
            return Pagination::stop(records, pages_fetched, StopReason::NoNewRecords);
        }
        if records.len() >= limits.max_records {
            return Pagination::stop(records, pages_fetched, StopReason::LimitReached);
        }
        page += 1;
    }
}
