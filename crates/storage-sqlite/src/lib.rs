//! SQLite persistence for the offline mutation queue.
//!
//! Reads go through an r2d2 pool; writes are funneled through a single writer thread
//! (see [`db::write_actor`]).

pub mod db;
pub mod errors;
pub mod offline;
pub mod schema;

pub use db::{create_pool, get_connection, init, open, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;
pub use offline::OfflineQueueRepository;
