use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::connectivity::ConnectivityMonitor;
use super::model::{
    cache_key, DrainReport, EnqueueOutcome, NewQueuedMutation, QueuedMutation, SubmitOutcome,
};
use super::mutation::{MutationInterface, MutationRequest};
use super::repository::OfflineQueueRepositoryTrait;
use crate::config::{RollcallConfig, DEFAULT_DRAIN_BATCH_SIZE};
use crate::errors::{Error, Result};
use crate::events::{NoOpOfflineQueueEventSink, OfflineQueueEvent, OfflineQueueEventSink};
use crate::records::Record;

/// Captures mutations that fail while offline and replays them, in order, once the
/// device is back online.
pub struct OfflineMutationService {
    repository: Arc<dyn OfflineQueueRepositoryTrait>,
    mutations: Arc<dyn MutationInterface>,
    connectivity: ConnectivityMonitor,
    event_sink: Arc<dyn OfflineQueueEventSink>,
    drain_lock: Mutex<()>,
    drain_batch_size: i64,
}

impl OfflineMutationService {
    pub fn new(
        repository: Arc<dyn OfflineQueueRepositoryTrait>,
        mutations: Arc<dyn MutationInterface>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            repository,
            mutations,
            connectivity,
            event_sink: Arc::new(NoOpOfflineQueueEventSink),
            drain_lock: Mutex::new(()),
            drain_batch_size: DEFAULT_DRAIN_BATCH_SIZE,
        }
    }

    /// Sets the sink notified about queued, replayed and failed entries.
    pub fn with_event_sink(mut self, event_sink: Arc<dyn OfflineQueueEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn with_config(mut self, config: &RollcallConfig) -> Self {
        self.drain_batch_size = config.drain_batch_size.max(1);
        self
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Performs a mutation, queueing it when it fails because the device is offline.
    ///
    /// Only a network-unreachable failure observed while the connectivity signal reports
    /// offline is queued. Every other failure is returned to the caller unchanged.
    pub async fn submit(&self, mutation_name: &str, payload: Record) -> Result<SubmitOutcome> {
        let key = cache_key(mutation_name, &payload)?;
        let request =
            MutationRequest::new(mutation_name, payload.clone()).with_idempotency_key(key);

        match self.mutations.mutate(&request).await {
            Ok(data) => Ok(SubmitOutcome::Completed(data)),
            Err(err) if err.is_network_unreachable() && !self.connectivity.is_online() => {
                debug!(
                    "[OfflineQueue] '{}' failed while offline, saving for replay: {}",
                    mutation_name, err
                );
                let outcome = self.enqueue(mutation_name, payload).await?;
                Ok(SubmitOutcome::QueuedOffline {
                    cache_key: outcome.entry().cache_key.clone(),
                    newly_queued: outcome.is_new(),
                })
            }
            Err(err) => {
                warn!("[OfflineQueue] '{}' failed while online: {}", mutation_name, err);
                Err(Error::Mutation(err))
            }
        }
    }

    /// Stores a replayable descriptor of the mutation. Identical pending descriptors are
    /// not stored twice.
    pub async fn enqueue(&self, mutation_name: &str, payload: Record) -> Result<EnqueueOutcome> {
        let entry = NewQueuedMutation::new(mutation_name, payload)?;
        let outcome = self.repository.enqueue(entry).await?;
        match &outcome {
            EnqueueOutcome::Queued(entry) => {
                info!(
                    "[OfflineQueue] Queued '{}' (seq={}, key={})",
                    entry.mutation_name, entry.sequence, entry.cache_key
                );
                self.event_sink.emit(OfflineQueueEvent::Queued {
                    cache_key: entry.cache_key.clone(),
                    mutation_name: entry.mutation_name.clone(),
                });
            }
            EnqueueOutcome::AlreadyQueued(entry) => {
                debug!(
                    "[OfflineQueue] '{}' already queued (key={}), ignoring duplicate",
                    entry.mutation_name, entry.cache_key
                );
            }
        }
        Ok(outcome)
    }

    /// Replays pending entries one at a time, in enqueue order.
    ///
    /// A call made while another drain is running, or while offline, returns a skipped
    /// report. Entries are fetched in batches until every entry that was pending when the
    /// drain started has been handled. Entries enqueued during the drain are left for the
    /// next one.
    pub async fn drain(&self) -> Result<DrainReport> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            debug!("[OfflineQueue] Drain already in progress, ignoring trigger");
            return Ok(DrainReport::skipped());
        };
        if !self.connectivity.is_online() {
            debug!("[OfflineQueue] Device offline, drain skipped");
            return Ok(DrainReport::skipped());
        }

        let mut report = DrainReport::default();
        let Some(last_sequence) = self.repository.last_pending_sequence()? else {
            debug!("[OfflineQueue] Nothing pending");
            return Ok(report);
        };
        let mut cursor = 0;

        'batches: loop {
            let batch: Vec<QueuedMutation> = self
                .repository
                .list_pending(cursor, self.drain_batch_size)?
                .into_iter()
                .take_while(|entry| entry.sequence <= last_sequence)
                .collect();
            if batch.is_empty() {
                break;
            }

            for entry in batch {
                if !self.connectivity.is_online() {
                    report.deferred = self.count_pending(entry.sequence - 1, last_sequence)?;
                    break 'batches;
                }
                cursor = entry.sequence;
                if !self
                    .repository
                    .mark_replaying(entry.cache_key.clone())
                    .await?
                {
                    debug!(
                        "[OfflineQueue] Entry {} left the pending state, skipping",
                        entry.cache_key
                    );
                    continue;
                }

                let request =
                    MutationRequest::new(entry.mutation_name.clone(), entry.payload.clone())
                        .with_idempotency_key(entry.cache_key.clone());

                match self.mutations.mutate(&request).await {
                    Ok(_) => {
                        self.finish_replayed(&entry).await?;
                        report.replayed.push(entry.cache_key);
                    }
                    Err(err) if err.is_network_unreachable() || !self.connectivity.is_online() => {
                        warn!(
                            "[OfflineQueue] Connectivity lost while replaying '{}': {}",
                            entry.mutation_name, err
                        );
                        self.repository
                            .return_to_pending(entry.cache_key.clone(), Some(err.to_string()))
                            .await?;
                        report.deferred = self.count_pending(entry.sequence - 1, last_sequence)?;
                        break 'batches;
                    }
                    Err(err) => {
                        error!(
                            "[OfflineQueue] Replay of '{}' failed terminally (key={}): {}",
                            entry.mutation_name, entry.cache_key, err
                        );
                        self.repository
                            .mark_failed(entry.cache_key.clone(), err.to_string())
                            .await?;
                        self.event_sink.emit(OfflineQueueEvent::ReplayFailed {
                            cache_key: entry.cache_key.clone(),
                            mutation_name: entry.mutation_name.clone(),
                            error: err.to_string(),
                        });
                        report.failed.push(entry.cache_key);
                    }
                }
            }
        }

        info!(
            "[OfflineQueue] Drain complete: replayed={} failed={} deferred={}",
            report.replayed.len(),
            report.failed.len(),
            report.deferred
        );
        Ok(report)
    }

    /// Removes a replayed entry. If the removal fails the entry goes back to `Pending`
    /// so it is not stranded in `Replaying` until the next startup recovery.
    async fn finish_replayed(&self, entry: &QueuedMutation) -> Result<()> {
        if let Err(err) = self.repository.remove(entry.cache_key.clone()).await {
            error!(
                "[OfflineQueue] Replayed '{}' but could not remove it (key={}): {}",
                entry.mutation_name, entry.cache_key, err
            );
            self.repository
                .return_to_pending(entry.cache_key.clone(), Some(err.to_string()))
                .await?;
            return Err(err);
        }
        debug!(
            "[OfflineQueue] Replayed '{}' (seq={})",
            entry.mutation_name, entry.sequence
        );
        self.event_sink.emit(OfflineQueueEvent::Replayed {
            cache_key: entry.cache_key.clone(),
            mutation_name: entry.mutation_name.clone(),
        });
        Ok(())
    }

    /// Pending entries with a sequence in `(after, through]`.
    fn count_pending(&self, after: i64, through: i64) -> Result<usize> {
        Ok(self
            .repository
            .list_pending(after, i64::MAX)?
            .into_iter()
            .take_while(|entry| entry.sequence <= through)
            .count())
    }

    /// Returns entries a crash left in `Replaying` to `Pending`. Call once at startup.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let reset = self.repository.reset_interrupted().await?;
        if reset > 0 {
            info!(
                "[OfflineQueue] Recovered {} interrupted replay(s) back to pending",
                reset
            );
        }
        Ok(reset)
    }

    pub fn pending(&self) -> Result<Vec<QueuedMutation>> {
        self.repository.list_pending(0, i64::MAX)
    }

    /// Entries in the "sync failed" state awaiting manual intervention.
    pub fn list_failed(&self) -> Result<Vec<QueuedMutation>> {
        self.repository.list_failed()
    }

    /// Puts a failed entry back at the tail of the queue.
    pub async fn retry_failed(&self, cache_key: &str) -> Result<bool> {
        let requeued = self.repository.requeue_failed(cache_key.to_string()).await?;
        if requeued {
            info!("[OfflineQueue] Re-queued failed entry {}", cache_key);
        }
        Ok(requeued)
    }

    /// Drops an entry for good, whatever its state.
    pub async fn discard(&self, cache_key: &str) -> Result<bool> {
        let removed = self.repository.remove(cache_key.to_string()).await?;
        if removed {
            info!("[OfflineQueue] Discarded entry {}", cache_key);
        }
        Ok(removed)
    }

    /// Drains the queue on every offline → online transition.
    ///
    /// The task runs until aborted through the returned handle.
    pub fn spawn_reconnect_listener(self: Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.connectivity.subscribe();
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let online = *receiver.borrow_and_update();
                if !online {
                    continue;
                }
                match self.drain().await {
                    Ok(report) if !report.skipped => debug!(
                        "[OfflineQueue] Reconnect drain replayed {} entr(y/ies)",
                        report.replayed.len()
                    ),
                    Ok(_) => {}
                    Err(err) => warn!("[OfflineQueue] Reconnect drain failed: {}", err),
                }
            }
        })
    }
}

impl std::fmt::Debug for OfflineMutationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineMutationService")
            .field("online", &self.connectivity.is_online())
            .field("drain_batch_size", &self.drain_batch_size)
            .finish()
    }
}
