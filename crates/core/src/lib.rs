//! Client-side reconciliation of server records and an offline mutation queue.
//!
//! Collections are merged by identity key, paged results accumulate across fetches,
//! records are bucketed for display, and writes made without connectivity are stored
//! and replayed in order once the device is back online.

pub mod config;
pub mod errors;
pub mod events;
pub mod offline;
pub mod pagination;
pub mod query;
pub mod reconcile;
pub mod records;

pub use config::RollcallConfig;
pub use errors::{DatabaseError, Error, Result};
pub use records::{IdentityKey, Overlay, Record};
