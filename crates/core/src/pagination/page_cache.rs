use std::hash::Hash;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::query::QueryParams;
use crate::reconcile::dedupe;

/// First page requested by every paginated query.
pub const FIRST_PAGE: u32 = 1;

/// One page as delivered by the query interface. Consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWindow<T> {
    pub page_number: u32,
    pub items: Vec<T>,
}

impl<T> PageWindow<T> {
    pub fn new(page_number: u32, items: Vec<T>) -> Self {
        Self {
            page_number: page_number.max(FIRST_PAGE),
            items,
        }
    }
}

/// Outcome of [`IncrementalPageCache::request_more`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    /// The last page had items; the cursor moved to the next page.
    Advanced(u32),
    /// The last page was empty; the cursor moved back to retry the previous page.
    Retreated(u32),
    /// A fetch is in flight or nothing has arrived yet.
    Ignored,
}

/// Accumulates successive pages of one query into a de-duplicated, order-preserving list.
#[derive(Debug, Clone)]
pub struct IncrementalPageCache<T> {
    accumulated: Option<Vec<T>>,
    cursor: u32,
    last_page_len: Option<usize>,
    params_fingerprint: Option<String>,
}

impl<T> Default for IncrementalPageCache<T> {
    fn default() -> Self {
        Self {
            accumulated: None,
            cursor: FIRST_PAGE,
            last_page_len: None,
            params_fingerprint: None,
        }
    }
}

impl<T> IncrementalPageCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page number the next fetch requests.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Accumulated records; empty until the first page arrives.
    pub fn accumulated(&self) -> &[T] {
        self.accumulated.as_deref().unwrap_or(&[])
    }

    /// True until a page has been applied since creation or the last reset.
    pub fn is_unset(&self) -> bool {
        self.accumulated.is_none()
    }

    pub fn last_page_len(&self) -> Option<usize> {
        self.last_page_len
    }

    /// Merges an arrived page into the accumulated list.
    ///
    /// The first non-empty page replaces the unset state outright; later pages are
    /// appended and the whole list de-duplicated by `key`, so re-applying a page leaves
    /// the state unchanged.
    pub fn on_page_arrived<K, F>(&mut self, page: PageWindow<T>, key: F)
    where
        K: Eq + Hash,
        F: Fn(&T) -> Option<K>,
    {
        let PageWindow { page_number, items } = page;
        self.last_page_len = Some(items.len());

        let merged = match self.accumulated.take() {
            Some(existing) if !existing.is_empty() => {
                dedupe(existing.into_iter().chain(items), key)
            }
            _ => dedupe(items, key),
        };
        debug!(
            "[PageCache] Applied page {} ({} items accumulated)",
            page_number,
            merged.len()
        );
        self.accumulated = Some(merged);
    }

    /// Moves the cursor after the caller asks for more data.
    ///
    /// Repeated calls while `in_flight` are no-ops. An empty last page moves the cursor
    /// back one page (never below the first page) so the previous page is fetched again.
    pub fn request_more(&mut self, in_flight: bool) -> CursorMove {
        if in_flight {
            return CursorMove::Ignored;
        }
        match self.last_page_len {
            None => CursorMove::Ignored,
            Some(0) => {
                self.cursor = self.cursor.saturating_sub(1).max(FIRST_PAGE);
                CursorMove::Retreated(self.cursor)
            }
            Some(_) => {
                self.cursor = self.cursor.saturating_add(1);
                CursorMove::Advanced(self.cursor)
            }
        }
    }

    /// Resets the cache when the filter parameters differ from the ones it was built for.
    ///
    /// Returns true when a reset happened. Pages fetched under old filters are never
    /// merged with pages fetched under new ones.
    pub fn sync_params(&mut self, params: &QueryParams) -> bool {
        let fingerprint = params.fingerprint();
        match self.params_fingerprint.as_deref() {
            Some(current) if current == fingerprint => false,
            None => {
                self.params_fingerprint = Some(fingerprint);
                false
            }
            Some(_) => {
                debug!("[PageCache] Filter parameters changed, discarding accumulated pages");
                self.reset();
                self.params_fingerprint = Some(fingerprint);
                true
            }
        }
    }

    /// Discards every accumulated page and rewinds the cursor.
    pub fn reset(&mut self) {
        self.accumulated = None;
        self.cursor = FIRST_PAGE;
        self.last_page_len = None;
    }

    pub fn into_accumulated(self) -> Vec<T> {
        self.accumulated.unwrap_or_default()
    }
}
