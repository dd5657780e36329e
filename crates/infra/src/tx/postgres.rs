//! Postgres-backed units of work.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | TxError | Scenario |
//! |------------|----------------------|---------|----------|
//! | Database (serialization failure) | `40001` | `ConcurrentTransaction` | Serializable read/write or write/write conflict |
//! | Database (deadlock detected) | `40P01` | `ConcurrentTransaction` | Two transactions waited on each other |
//! | Any | N/A | `Begin` | Pool exhausted/closed or connection failure while opening |
//! | Any | N/A | `Commit` / `Rollback` | Failure while terminating |
//! | Any | N/A | `Database` | Failure of a statement inside the unit |
//!
//! ## Thread Safety
//!
//! `PgBeginner` is `Send + Sync` and cheap to clone. A `PgUnit` owns its
//! connection and is used by one task at a time.

use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;

use super::{Beginner, TxError, Unit};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Opens serializable transactions on a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgBeginner {
    pool: Arc<PgPool>,
}

impl PgBeginner {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A Postgres unit of work.
///
/// `Serializable` holds the open transaction until commit/rollback takes it.
/// `Passthrough` lazily checks out a pooled connection and runs statements in
/// autocommit mode; its commit/rollback just return the connection.
pub enum PgUnit {
    Serializable(Option<Transaction<'static, Postgres>>),
    Passthrough {
        pool: Arc<PgPool>,
        conn: Option<PoolConnection<Postgres>>,
    },
}

impl PgUnit {
    /// Connection to run statements on, inside the transaction if there is one.
    pub async fn connection(&mut self) -> Result<&mut PgConnection, TxError> {
        match self {
            PgUnit::Serializable(tx) => tx.as_deref_mut().ok_or(TxError::Finished),
            PgUnit::Passthrough { pool, conn } => {
                if conn.is_none() {
                    let acquired = pool
                        .acquire()
                        .await
                        .map_err(|e| map_sqlx_error("acquire", e))?;
                    *conn = Some(acquired);
                }
                conn.as_deref_mut().ok_or(TxError::Finished)
            }
        }
    }
}

#[async_trait::async_trait]
impl Unit for PgUnit {
    fn is_transactional(&self) -> bool {
        matches!(self, PgUnit::Serializable(_))
    }

    async fn commit(&mut self) -> Result<(), TxError> {
        match self {
            PgUnit::Serializable(slot) => match slot.take() {
                Some(tx) => tx.commit().await.map_err(|e| map_sqlx_error("commit", e)),
                None => Ok(()),
            },
            PgUnit::Passthrough { conn, .. } => {
                conn.take();
                Ok(())
            }
        }
    }

    async fn rollback(&mut self) -> Result<(), TxError> {
        match self {
            PgUnit::Serializable(slot) => match slot.take() {
                Some(tx) => tx
                    .rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e)),
                None => Ok(()),
            },
            PgUnit::Passthrough { conn, .. } => {
                conn.take();
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl Beginner for PgBeginner {
    type Unit = PgUnit;

    async fn begin_tx(&self) -> Result<PgUnit, TxError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Must be the first statement of the transaction.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        debug!("serializable transaction opened");
        Ok(PgUnit::Serializable(Some(tx)))
    }

    fn no_tx(&self) -> PgUnit {
        PgUnit::Passthrough {
            pool: self.pool.clone(),
            conn: None,
        }
    }
}

/// Map SQLx errors to TxError.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> TxError {
    if is_conflict(&err) {
        return TxError::ConcurrentTransaction;
    }

    let msg = match &err {
        sqlx::Error::Database(db_err) => {
            format!("database error in {}: {}", operation, db_err.message())
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {}", operation),
        sqlx::Error::PoolTimedOut => format!("connection pool timed out in {}", operation),
        _ => format!("sqlx error in {}: {}", operation, err),
    };

    match operation {
        "begin" | "set_isolation" => TxError::Begin(msg),
        "commit" => TxError::Commit(msg),
        "rollback" => TxError::Rollback(msg),
        _ => TxError::Database(msg),
    }
}

/// Check if an error is a serialization failure or deadlock.
fn is_conflict(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == SERIALIZATION_FAILURE || code.as_ref() == DEADLOCK_DETECTED;
        }
    }
    false
}
