//! Offline queue domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::records::Record;

/// Lifecycle of a queued mutation. `Succeeded` entries are removed rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedMutationStatus {
    Pending,
    Replaying,
    Succeeded,
    FailedTerminal,
}

impl QueuedMutationStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Replaying => "replaying",
            Self::Succeeded => "succeeded",
            Self::FailedTerminal => "failed_terminal",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "replaying" => Some(Self::Replaying),
            "succeeded" => Some(Self::Succeeded),
            "failed_terminal" => Some(Self::FailedTerminal),
            _ => None,
        }
    }
}

/// A persisted, replayable descriptor of a mutation that failed while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Enqueue order; replay follows it.
    pub sequence: i64,
    pub cache_key: String,
    pub mutation_name: String,
    pub payload: Record,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: i32,
    pub status: QueuedMutationStatus,
    pub last_error: Option<String>,
}

/// Insert request for the queue table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueuedMutation {
    pub cache_key: String,
    pub mutation_name: String,
    pub payload: Record,
    pub enqueued_at: DateTime<Utc>,
}

impl NewQueuedMutation {
    pub fn new(mutation_name: impl Into<String>, payload: Record) -> Result<Self> {
        let mutation_name = mutation_name.into();
        let cache_key = cache_key(&mutation_name, &payload)?;
        Ok(Self {
            cache_key,
            mutation_name,
            payload,
            enqueued_at: Utc::now(),
        })
    }
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new `Pending` entry was written (or a terminally failed one re-armed).
    Queued(QueuedMutation),
    /// An entry with the same cache key is already waiting; nothing was written.
    AlreadyQueued(QueuedMutation),
}

impl EnqueueOutcome {
    pub fn entry(&self) -> &QueuedMutation {
        match self {
            Self::Queued(entry) | Self::AlreadyQueued(entry) => entry,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// What the caller of a mutation should tell the user.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The mutation reached the server.
    Completed(Option<Record>),
    /// The device is offline; the action was saved locally and will sync later.
    QueuedOffline { cache_key: String, newly_queued: bool },
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Another drain was already running, or the device was offline.
    pub skipped: bool,
    pub replayed: Vec<String>,
    pub failed: Vec<String>,
    /// Entries still pending because connectivity dropped mid-drain.
    pub deferred: usize,
}

impl DrainReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Deterministic key of a `(mutation_name, payload)` pair.
///
/// `serde_json` keeps object keys sorted, so equal payloads serialize identically no
/// matter how they were built.
pub fn cache_key(mutation_name: &str, payload: &Record) -> Result<String> {
    let canonical = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(mutation_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(&canonical);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}
