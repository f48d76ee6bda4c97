//! Contract of the consumed mutation interface and the name → handler lookup table used
//! to resolve queued descriptors at replay time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::records::Record;

/// A named write, carrying the key replays are de-duplicated by.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub mutation_name: String,
    pub payload: Record,
    /// Cache key of the `(mutation_name, payload)` pair. Transports may forward it to
    /// the backend; this layer does not assume the backend honors it.
    pub idempotency_key: Option<String>,
}

impl MutationRequest {
    pub fn new(mutation_name: impl Into<String>, payload: Record) -> Self {
        Self {
            mutation_name: mutation_name.into(),
            payload,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Typed failure of a mutation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The server could not be reached. The only error that leads to offline queueing.
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The server answered and refused the write.
    #[error("Rejected ({status:?}): {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// No handler is registered under the mutation name.
    #[error("Unknown mutation '{0}'")]
    UnknownMutation(String),
}

impl MutationError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkUnreachable(message.into())
    }

    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn is_network_unreachable(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_))
    }

    /// Short machine-readable code stored alongside failed queue entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkUnreachable(_) => "network_unreachable",
            Self::Rejected { .. } => "rejected",
            Self::UnknownMutation(_) => "unknown_mutation",
        }
    }
}

pub type MutationResult = std::result::Result<Option<Record>, MutationError>;

/// Performs a named write and returns the server's view of the result, if any.
#[async_trait]
pub trait MutationInterface: Send + Sync {
    async fn mutate(&self, request: &MutationRequest) -> MutationResult;
}

/// One callable behind a mutation name.
#[async_trait]
pub trait MutationHandler: Send + Sync {
    async fn call(&self, payload: &Record, idempotency_key: Option<&str>) -> MutationResult;
}

/// Lookup table from mutation name to handler.
///
/// Queued entries only store `(mutation_name, payload)`, so they survive restarts; the
/// callable is resolved here when the entry is replayed.
#[derive(Default, Clone)]
pub struct MutationRegistry {
    handlers: HashMap<String, Arc<dyn MutationHandler>>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        mutation_name: impl Into<String>,
        handler: Arc<dyn MutationHandler>,
    ) -> Self {
        self.handlers.insert(mutation_name.into(), handler);
        self
    }

    pub fn contains(&self, mutation_name: &str) -> bool {
        self.handlers.contains_key(mutation_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for MutationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names().collect::<Vec<_>>();
        names.sort_unstable();
        f.debug_struct("MutationRegistry")
            .field("handlers", &names)
            .finish()
    }
}

#[async_trait]
impl MutationInterface for MutationRegistry {
    async fn mutate(&self, request: &MutationRequest) -> MutationResult {
        let handler = self
            .handlers
            .get(&request.mutation_name)
            .ok_or_else(|| MutationError::UnknownMutation(request.mutation_name.clone()))?;
        handler
            .call(&request.payload, request.idempotency_key.as_deref())
            .await
    }
}
