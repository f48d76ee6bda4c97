//! SQLite storage for the offline mutation queue.

mod model;
mod repository;

pub use model::{NewOfflineMutationDB, OfflineMutationDB};
pub use repository::OfflineQueueRepository;
