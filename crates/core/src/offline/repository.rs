use async_trait::async_trait;

use super::model::{EnqueueOutcome, NewQueuedMutation, QueuedMutation};
use crate::errors::Result;

/// Persisted queue table behind the offline mutation service.
///
/// Writes are serialized by the implementation; reads may run concurrently with them.
#[async_trait]
pub trait OfflineQueueRepositoryTrait: Send + Sync {
    /// Inserts a `Pending` entry unless one with the same cache key is pending or
    /// replaying. A terminally failed entry with that key is re-armed at the tail.
    async fn enqueue(&self, entry: NewQueuedMutation) -> Result<EnqueueOutcome>;

    /// Pending entries with a sequence above `after_sequence`, in enqueue order.
    fn list_pending(&self, after_sequence: i64, limit: i64) -> Result<Vec<QueuedMutation>>;

    /// Highest sequence among pending entries, if any.
    fn last_pending_sequence(&self) -> Result<Option<i64>>;

    /// Entries that failed terminally, oldest first.
    fn list_failed(&self) -> Result<Vec<QueuedMutation>>;

    fn get(&self, cache_key: &str) -> Result<Option<QueuedMutation>>;

    /// Pending → Replaying, counting the attempt. Returns false when the entry is no
    /// longer pending.
    async fn mark_replaying(&self, cache_key: String) -> Result<bool>;

    /// Replaying → Pending, e.g. when connectivity dropped mid-replay.
    async fn return_to_pending(&self, cache_key: String, error: Option<String>) -> Result<()>;

    /// Replaying → FailedTerminal.
    async fn mark_failed(&self, cache_key: String, error: String) -> Result<()>;

    /// Deletes the entry (successful replay or user discard). Returns true if it existed.
    async fn remove(&self, cache_key: String) -> Result<bool>;

    /// FailedTerminal → Pending at the tail of the queue. Returns false when no failed
    /// entry has that key.
    async fn requeue_failed(&self, cache_key: String) -> Result<bool>;

    /// Every Replaying entry back to Pending; returns how many were reset.
    async fn reset_interrupted(&self) -> Result<usize>;
}
