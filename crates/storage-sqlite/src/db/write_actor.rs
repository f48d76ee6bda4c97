//! Serializes every write through one dedicated connection thread.
//!
//! SQLite allows a single writer at a time; routing writes through one queue avoids
//! `SQLITE_BUSY` between pool connections. Each job runs inside an immediate transaction.

use diesel::sqlite::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use rollcall_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send>;

#[derive(Clone, Debug)]
pub struct WriteHandle {
    sender: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` in a transaction on the writer thread and waits for its result.
    /// An error returned by `job` rolls the transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let boxed: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, StorageError, _>(|tx| {
                    job(tx).map_err(StorageError::from)
                })
                .map_err(Error::from);
            let _ = reply_tx.send(result);
        });

        self.sender.send(boxed).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "SQLite writer is no longer running".to_string(),
            ))
        })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "SQLite writer dropped the job without replying".to_string(),
            ))
        })?
    }
}

/// Starts the writer thread. It stops once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

    std::thread::spawn(move || {
        debug!("[SqliteWriter] Writer thread started");
        while let Some(job) = receiver.blocking_recv() {
            match pool.get() {
                Ok(mut conn) => job(&mut *conn),
                Err(err) => {
                    // The job's reply channel is dropped with it; the caller sees an error.
                    error!("[SqliteWriter] Failed to acquire connection: {}", err);
                }
            }
        }
        debug!("[SqliteWriter] All handles dropped, writer thread exiting");
    });

    WriteHandle { sender }
}
