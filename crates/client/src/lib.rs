//! REST adapter for the query and mutation interfaces.

pub mod client;
pub mod error;

pub use client::RestClient;
pub use error::{ClientError, Result};
