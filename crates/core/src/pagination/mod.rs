//! Incremental accumulation of paginated query results.

mod collection;
mod page_cache;
mod registry;

pub use collection::PaginatedCollection;
pub use page_cache::{CursorMove, IncrementalPageCache, PageWindow, FIRST_PAGE};
pub use registry::PageCacheRegistry;
