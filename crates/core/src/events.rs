//! Notifications emitted by the offline queue for the UI layer.

use serde::{Deserialize, Serialize};

/// Events surfaced to the user about locally saved actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfflineQueueEvent {
    /// The action was saved locally and will sync when the device is back online.
    Queued {
        cache_key: String,
        mutation_name: String,
    },
    /// A queued action reached the server and left the queue.
    Replayed {
        cache_key: String,
        mutation_name: String,
    },
    /// A queued action was refused while online and needs manual intervention.
    ReplayFailed {
        cache_key: String,
        mutation_name: String,
        error: String,
    },
}

impl OfflineQueueEvent {
    pub fn cache_key(&self) -> &str {
        match self {
            Self::Queued { cache_key, .. }
            | Self::Replayed { cache_key, .. }
            | Self::ReplayFailed { cache_key, .. } => cache_key,
        }
    }
}

/// Receives [`OfflineQueueEvent`]s. Runtime bridges forward them to the UI.
pub trait OfflineQueueEventSink: Send + Sync {
    fn emit(&self, event: OfflineQueueEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpOfflineQueueEventSink;

impl OfflineQueueEventSink for NoOpOfflineQueueEventSink {
    fn emit(&self, _event: OfflineQueueEvent) {}
}
