//! Database models for the offline mutation queue.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use rollcall_core::errors::{DatabaseError, Error, Result};
use rollcall_core::offline::{QueuedMutation, QueuedMutationStatus};

#[derive(
    Queryable,
    Identifiable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(sequence))]
#[diesel(table_name = crate::schema::offline_mutations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OfflineMutationDB {
    pub sequence: i64,
    pub cache_key: String,
    pub mutation_name: String,
    pub payload: String,
    pub enqueued_at: String,
    pub attempts: i32,
    pub status: String,
    pub last_error: Option<String>,
    pub updated_at: String,
}

/// Insert row; `sequence` is assigned by SQLite so re-inserted rows land at the tail.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::offline_mutations)]
pub struct NewOfflineMutationDB {
    pub cache_key: String,
    pub mutation_name: String,
    pub payload: String,
    pub enqueued_at: String,
    pub attempts: i32,
    pub status: String,
    pub last_error: Option<String>,
    pub updated_at: String,
}

impl NewOfflineMutationDB {
    /// Copy of an existing row, back in `Pending`, for re-insertion at the tail.
    pub fn requeued_from(row: OfflineMutationDB, now: String) -> Self {
        Self {
            cache_key: row.cache_key,
            mutation_name: row.mutation_name,
            payload: row.payload,
            enqueued_at: row.enqueued_at,
            attempts: row.attempts,
            status: QueuedMutationStatus::Pending.as_db_str().to_string(),
            last_error: row.last_error,
            updated_at: now,
        }
    }
}

impl TryFrom<OfflineMutationDB> for QueuedMutation {
    type Error = Error;

    fn try_from(row: OfflineMutationDB) -> Result<Self> {
        let status = QueuedMutationStatus::from_db_str(&row.status).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "Unknown offline mutation status '{}'",
                row.status
            )))
        })?;
        let enqueued_at = DateTime::parse_from_rfc3339(&row.enqueued_at)
            .map_err(|e| {
                Error::Database(DatabaseError::Internal(format!(
                    "Invalid enqueued_at '{}': {}",
                    row.enqueued_at, e
                )))
            })?
            .with_timezone(&Utc);

        Ok(QueuedMutation {
            sequence: row.sequence,
            cache_key: row.cache_key,
            mutation_name: row.mutation_name,
            payload: serde_json::from_str(&row.payload)?,
            enqueued_at,
            attempts: row.attempts,
            status,
            last_error: row.last_error,
        })
    }
}
