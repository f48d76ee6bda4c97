use std::sync::Arc;

use log::{debug, warn};

use super::page_cache::{CursorMove, IncrementalPageCache, PageWindow};
use crate::errors::{Error, Result};
use crate::query::{QueryInterface, QueryParams, QuerySnapshot};
use crate::records::{by_field, Record};

/// A paginated collection bound to one query key.
///
/// Page requests are serialized: every fetch borrows the collection mutably, so page N+1
/// can only be requested after page N has been applied.
pub struct PaginatedCollection {
    query: Arc<dyn QueryInterface>,
    query_key: String,
    identity_field: String,
    params: QueryParams,
    cache: IncrementalPageCache<Record>,
    last_snapshot: Option<QuerySnapshot>,
}

impl PaginatedCollection {
    pub fn new(
        query: Arc<dyn QueryInterface>,
        query_key: impl Into<String>,
        identity_field: impl Into<String>,
        params: QueryParams,
    ) -> Self {
        let mut cache = IncrementalPageCache::new();
        cache.sync_params(&params);
        Self {
            query,
            query_key: query_key.into(),
            identity_field: identity_field.into(),
            params,
            cache,
            last_snapshot: None,
        }
    }

    pub fn query_key(&self) -> &str {
        &self.query_key
    }

    pub fn items(&self) -> &[Record] {
        self.cache.accumulated()
    }

    pub fn cursor(&self) -> u32 {
        self.cache.cursor()
    }

    pub fn last_snapshot(&self) -> Option<&QuerySnapshot> {
        self.last_snapshot.as_ref()
    }

    fn in_flight(&self) -> bool {
        self.last_snapshot
            .as_ref()
            .map(|s| s.is_fetching || s.is_loading)
            .unwrap_or(false)
    }

    /// Switches to new filter parameters; returns true when accumulated pages were dropped.
    pub fn set_params(&mut self, params: QueryParams) -> bool {
        let reset = self.cache.sync_params(&params);
        self.params = params;
        if reset {
            self.last_snapshot = None;
        }
        reset
    }

    /// Fetches the page under the cursor and applies it.
    ///
    /// A failed fetch is surfaced as [`Error::Query`] and leaves the accumulated state
    /// untouched; there is no automatic retry.
    pub async fn load_current(&mut self) -> Result<&[Record]> {
        let page_number = self.cache.cursor();
        let params = self.params.for_page(page_number);
        let snapshot = self.query.fetch(&self.query_key, &params).await;

        if snapshot.is_error {
            let message = snapshot
                .error
                .clone()
                .unwrap_or_else(|| "query failed".to_string());
            warn!(
                "[PageCache] Fetch of '{}' page {} failed: {}",
                self.query_key, page_number, message
            );
            self.last_snapshot = Some(snapshot);
            return Err(Error::Query(message));
        }

        if snapshot.is_success {
            if let Some(items) = snapshot.data.clone() {
                self.cache.on_page_arrived(
                    PageWindow::new(page_number, items),
                    by_field(&self.identity_field),
                );
            }
        } else {
            debug!(
                "[PageCache] '{}' page {} not ready yet (loading={}, fetching={})",
                self.query_key, page_number, snapshot.is_loading, snapshot.is_fetching
            );
        }
        self.last_snapshot = Some(snapshot);
        Ok(self.cache.accumulated())
    }

    /// Moves the cursor without fetching.
    pub fn request_more(&mut self) -> CursorMove {
        let in_flight = self.in_flight();
        self.cache.request_more(in_flight)
    }

    /// Moves the cursor and, unless the request was ignored, fetches the new page.
    pub async fn load_more(&mut self) -> Result<CursorMove> {
        let movement = self.request_more();
        if movement != CursorMove::Ignored {
            self.load_current().await?;
        }
        Ok(movement)
    }

    /// Drops every accumulated page, e.g. when the owning screen regains focus.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.last_snapshot = None;
    }
}
