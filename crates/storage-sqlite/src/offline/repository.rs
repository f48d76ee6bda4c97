//! Repository for the offline mutation queue table.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use rollcall_core::errors::Result;
use rollcall_core::offline::{
    EnqueueOutcome, NewQueuedMutation, OfflineQueueRepositoryTrait, QueuedMutation,
    QueuedMutationStatus,
};

use super::model::{NewOfflineMutationDB, OfflineMutationDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::offline_mutations;

fn status_db(status: QueuedMutationStatus) -> &'static str {
    status.as_db_str()
}

fn to_queued_mutations(rows: Vec<OfflineMutationDB>) -> Result<Vec<QueuedMutation>> {
    rows.into_iter().map(QueuedMutation::try_from).collect()
}

fn find_by_key(conn: &mut SqliteConnection, key: &str) -> Result<Option<OfflineMutationDB>> {
    Ok(offline_mutations::table
        .filter(offline_mutations::cache_key.eq(key))
        .first::<OfflineMutationDB>(conn)
        .optional()
        .map_err(StorageError::from)?)
}

/// Deletes the row and inserts it again so AUTOINCREMENT hands out a fresh, larger
/// sequence.
fn move_to_tail(conn: &mut SqliteConnection, row: OfflineMutationDB) -> Result<OfflineMutationDB> {
    diesel::delete(offline_mutations::table.find(row.sequence))
        .execute(conn)
        .map_err(StorageError::from)?;
    let requeued = NewOfflineMutationDB::requeued_from(row, Utc::now().to_rfc3339());
    Ok(diesel::insert_into(offline_mutations::table)
        .values(&requeued)
        .returning(OfflineMutationDB::as_returning())
        .get_result(conn)
        .map_err(StorageError::from)?)
}

pub struct OfflineQueueRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl OfflineQueueRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    fn list_by_status(
        &self,
        status: QueuedMutationStatus,
        after_sequence: i64,
        limit_value: i64,
    ) -> Result<Vec<QueuedMutation>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = offline_mutations::table
            .filter(offline_mutations::status.eq(status_db(status)))
            .filter(offline_mutations::sequence.gt(after_sequence))
            .order(offline_mutations::sequence.asc())
            .limit(limit_value)
            .load::<OfflineMutationDB>(&mut conn)
            .map_err(StorageError::from)?;
        to_queued_mutations(rows)
    }
}

#[async_trait]
impl OfflineQueueRepositoryTrait for OfflineQueueRepository {
    async fn enqueue(&self, entry: NewQueuedMutation) -> Result<EnqueueOutcome> {
        self.writer
            .exec(move |conn| {
                if let Some(existing) = find_by_key(conn, &entry.cache_key)? {
                    if existing.status != status_db(QueuedMutationStatus::FailedTerminal) {
                        return Ok(EnqueueOutcome::AlreadyQueued(existing.try_into()?));
                    }
                    diesel::delete(offline_mutations::table.find(existing.sequence))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }

                let now = Utc::now().to_rfc3339();
                let row = NewOfflineMutationDB {
                    cache_key: entry.cache_key,
                    mutation_name: entry.mutation_name,
                    payload: serde_json::to_string(&entry.payload)?,
                    enqueued_at: entry.enqueued_at.to_rfc3339(),
                    attempts: 0,
                    status: status_db(QueuedMutationStatus::Pending).to_string(),
                    last_error: None,
                    updated_at: now,
                };
                let inserted = diesel::insert_into(offline_mutations::table)
                    .values(&row)
                    .returning(OfflineMutationDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                Ok(EnqueueOutcome::Queued(inserted.try_into()?))
            })
            .await
    }

    fn list_pending(&self, after_sequence: i64, limit: i64) -> Result<Vec<QueuedMutation>> {
        self.list_by_status(QueuedMutationStatus::Pending, after_sequence, limit)
    }

    fn last_pending_sequence(&self) -> Result<Option<i64>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(offline_mutations::table
            .filter(offline_mutations::status.eq(status_db(QueuedMutationStatus::Pending)))
            .select(diesel::dsl::max(offline_mutations::sequence))
            .first::<Option<i64>>(&mut conn)
            .map_err(StorageError::from)?)
    }

    fn list_failed(&self) -> Result<Vec<QueuedMutation>> {
        self.list_by_status(QueuedMutationStatus::FailedTerminal, 0, i64::MAX)
    }

    fn get(&self, cache_key: &str) -> Result<Option<QueuedMutation>> {
        let mut conn = get_connection(&self.pool)?;
        find_by_key(&mut conn, cache_key)?
            .map(QueuedMutation::try_from)
            .transpose()
    }

    async fn mark_replaying(&self, cache_key: String) -> Result<bool> {
        self.writer
            .exec(move |conn| {
                let updated = diesel::update(
                    offline_mutations::table
                        .filter(offline_mutations::cache_key.eq(&cache_key))
                        .filter(
                            offline_mutations::status
                                .eq(status_db(QueuedMutationStatus::Pending)),
                        ),
                )
                .set((
                    offline_mutations::status.eq(status_db(QueuedMutationStatus::Replaying)),
                    offline_mutations::attempts.eq(offline_mutations::attempts + 1),
                    offline_mutations::updated_at.eq(Utc::now().to_rfc3339()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(updated > 0)
            })
            .await
    }

    async fn return_to_pending(&self, cache_key: String, error: Option<String>) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(
                    offline_mutations::table
                        .filter(offline_mutations::cache_key.eq(&cache_key))
                        .filter(
                            offline_mutations::status
                                .eq(status_db(QueuedMutationStatus::Replaying)),
                        ),
                )
                .set((
                    offline_mutations::status.eq(status_db(QueuedMutationStatus::Pending)),
                    offline_mutations::last_error.eq(error),
                    offline_mutations::updated_at.eq(Utc::now().to_rfc3339()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_failed(&self, cache_key: String, error: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(
                    offline_mutations::table.filter(offline_mutations::cache_key.eq(&cache_key)),
                )
                .set((
                    offline_mutations::status
                        .eq(status_db(QueuedMutationStatus::FailedTerminal)),
                    offline_mutations::last_error.eq(Some(error)),
                    offline_mutations::updated_at.eq(Utc::now().to_rfc3339()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, cache_key: String) -> Result<bool> {
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    offline_mutations::table.filter(offline_mutations::cache_key.eq(&cache_key)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn requeue_failed(&self, cache_key: String) -> Result<bool> {
        self.writer
            .exec(move |conn| {
                match find_by_key(conn, &cache_key)? {
                    Some(row)
                        if row.status == status_db(QueuedMutationStatus::FailedTerminal) =>
                    {
                        move_to_tail(conn, row)?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
            .await
    }

    async fn reset_interrupted(&self) -> Result<usize> {
        self.writer
            .exec(|conn| {
                let reset = diesel::update(
                    offline_mutations::table.filter(
                        offline_mutations::status.eq(status_db(QueuedMutationStatus::Replaying)),
                    ),
                )
                .set((
                    offline_mutations::status.eq(status_db(QueuedMutationStatus::Pending)),
                    offline_mutations::updated_at.eq(Utc::now().to_rfc3339()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(reset)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::records::Record;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::db::{create_pool, init, run_migrations, write_actor::spawn_writer};

    fn setup_repository() -> OfflineQueueRepository {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        OfflineQueueRepository::new(pool, writer)
    }

    fn entry(name: &str, payload: serde_json::Value) -> NewQueuedMutation {
        NewQueuedMutation::new(name, Record::from_value(payload).expect("object"))
            .expect("new entry")
    }

    #[tokio::test]
    async fn enqueue_persists_and_suppresses_duplicates() {
        let repo = setup_repository();

        let first = repo
            .enqueue(entry("checkIn", json!({ "guestId": 1, "desk": "A" })))
            .await
            .expect("enqueue");
        assert!(first.is_new());
        assert_eq!(first.entry().status, QueuedMutationStatus::Pending);
        assert_eq!(first.entry().attempts, 0);

        let duplicate = repo
            .enqueue(entry("checkIn", json!({ "desk": "A", "guestId": 1 })))
            .await
            .expect("enqueue duplicate");
        assert!(!duplicate.is_new());
        assert_eq!(duplicate.entry().sequence, first.entry().sequence);

        let pending = repo.list_pending(0, 10).expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].payload,
            Record::from_value(json!({ "guestId": 1, "desk": "A" })).expect("object")
        );
        assert_eq!(
            pending[0].enqueued_at.timestamp(),
            first.entry().enqueued_at.timestamp()
        );
    }

    #[tokio::test]
    async fn pending_entries_are_listed_in_enqueue_order() {
        let repo = setup_repository();
        for guest in 1..=4 {
            repo.enqueue(entry("checkIn", json!({ "guestId": guest })))
                .await
                .expect("enqueue");
        }

        let pending = repo.list_pending(0, 3).expect("pending");
        let guests = pending
            .iter()
            .map(|e| e.payload.get("guestId").cloned())
            .collect::<Vec<_>>();
        assert_eq!(guests, vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);
        assert!(pending.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let rest = repo
            .list_pending(pending[2].sequence, 3)
            .expect("next batch");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].payload.get("guestId"), Some(&json!(4)));
        assert_eq!(
            repo.last_pending_sequence().expect("last sequence"),
            Some(rest[0].sequence)
        );
    }

    #[tokio::test]
    async fn last_pending_sequence_ignores_other_states() {
        let repo = setup_repository();
        assert_eq!(repo.last_pending_sequence().expect("empty"), None);

        let first = repo
            .enqueue(entry("checkIn", json!({ "guestId": 1 })))
            .await
            .expect("enqueue")
            .entry()
            .clone();
        let second = repo
            .enqueue(entry("checkIn", json!({ "guestId": 2 })))
            .await
            .expect("enqueue")
            .entry()
            .clone();
        assert!(repo
            .mark_replaying(second.cache_key.clone())
            .await
            .expect("mark replaying"));

        assert_eq!(
            repo.last_pending_sequence().expect("last sequence"),
            Some(first.sequence)
        );
    }

    #[tokio::test]
    async fn replay_state_transitions() {
        let repo = setup_repository();
        let key = repo
            .enqueue(entry("checkIn", json!({ "guestId": 1 })))
            .await
            .expect("enqueue")
            .entry()
            .cache_key
            .clone();

        assert!(repo.mark_replaying(key.clone()).await.expect("replaying"));
        assert!(!repo.mark_replaying(key.clone()).await.expect("not pending"));
        assert!(repo.list_pending(0, 10).expect("pending").is_empty());

        let duplicate = repo
            .enqueue(entry("checkIn", json!({ "guestId": 1 })))
            .await
            .expect("enqueue while replaying");
        assert!(!duplicate.is_new());

        repo.return_to_pending(key.clone(), Some("connection reset".to_string()))
            .await
            .expect("back to pending");
        let stored = repo.get(&key).expect("get").expect("exists");
        assert_eq!(stored.status, QueuedMutationStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection reset"));

        assert!(repo.mark_replaying(key.clone()).await.expect("replaying"));
        repo.mark_failed(key.clone(), "Rejected (Some(409)): closed".to_string())
            .await
            .expect("failed");
        let failed = repo.list_failed().expect("failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, QueuedMutationStatus::FailedTerminal);
        assert_eq!(failed[0].attempts, 2);

        assert!(repo.remove(key.clone()).await.expect("remove"));
        assert!(!repo.remove(key.clone()).await.expect("remove again"));
        assert!(repo.get(&key).expect("get").is_none());
    }

    #[tokio::test]
    async fn failed_entries_rearm_at_the_tail() {
        let repo = setup_repository();
        let failed_key = repo
            .enqueue(entry("checkIn", json!({ "guestId": 1 })))
            .await
            .expect("enqueue")
            .entry()
            .cache_key
            .clone();
        repo.enqueue(entry("checkIn", json!({ "guestId": 2 })))
            .await
            .expect("enqueue");

        repo.mark_replaying(failed_key.clone())
            .await
            .expect("replaying");
        repo.mark_failed(failed_key.clone(), "rejected".to_string())
            .await
            .expect("failed");

        assert!(repo
            .requeue_failed(failed_key.clone())
            .await
            .expect("requeue"));
        assert!(!repo
            .requeue_failed(failed_key.clone())
            .await
            .expect("requeue pending"));

        let order = repo
            .list_pending(0, 10)
            .expect("pending")
            .into_iter()
            .map(|e| e.payload.get("guestId").cloned())
            .collect::<Vec<_>>();
        assert_eq!(order, vec![Some(json!(2)), Some(json!(1))]);

        repo.mark_replaying(failed_key.clone())
            .await
            .expect("replaying");
        repo.mark_failed(failed_key.clone(), "rejected".to_string())
            .await
            .expect("failed");
        let rearmed = repo
            .enqueue(entry("checkIn", json!({ "guestId": 1 })))
            .await
            .expect("enqueue after failure");
        assert!(rearmed.is_new());
        assert_eq!(rearmed.entry().attempts, 0);
        assert!(repo.list_failed().expect("failed").is_empty());
    }

    #[tokio::test]
    async fn interrupted_replays_reset_to_pending() {
        let repo = setup_repository();
        for guest in 1..=2 {
            let key = repo
                .enqueue(entry("checkIn", json!({ "guestId": guest })))
                .await
                .expect("enqueue")
                .entry()
                .cache_key
                .clone();
            repo.mark_replaying(key).await.expect("replaying");
        }

        assert_eq!(repo.reset_interrupted().await.expect("reset"), 2);
        assert_eq!(repo.reset_interrupted().await.expect("reset again"), 0);
        assert_eq!(repo.list_pending(0, 10).expect("pending").len(), 2);
    }

    #[tokio::test]
    async fn queue_survives_reopening_the_database() {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        {
            let pool = create_pool(&db_path).expect("create pool");
            let writer = spawn_writer(pool.as_ref().clone());
            let repo = OfflineQueueRepository::new(pool, writer);
            repo.enqueue(entry("checkIn", json!({ "guestId": 1 })))
                .await
                .expect("enqueue");
        }

        run_migrations(&db_path).expect("migrations are idempotent");
        let pool = create_pool(&db_path).expect("reopen pool");
        let writer = spawn_writer(pool.as_ref().clone());
        let repo = OfflineQueueRepository::new(pool, writer);
        let pending = repo.list_pending(0, 10).expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mutation_name, "checkIn");
    }
}
