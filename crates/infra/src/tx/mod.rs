//! Transactional units of work.
//!
//! A [`Beginner`] hands out [`Unit`]s in two flavours:
//!
//! - `begin_tx()`: a real transaction at the strictest isolation level the
//!   backend offers (serializable), so concurrent read/write conflicts surface
//!   at commit time and can be retried by [`run_in_tx`].
//! - `no_tx()`: a passthrough whose commit/rollback do nothing, for reads that
//!   need no isolation.
//!
//! Storage methods take `&mut B::Unit` in both cases, so read paths and write
//! paths go through the same signatures.
//!
//! ## Termination
//!
//! Every unit is terminated by exactly one `commit` or `rollback`. Both are
//! idempotent on an already-finished unit (they return `Ok`), and a unit that is
//! dropped without being terminated is rolled back by its backend.

pub mod in_memory;
pub mod postgres;
pub mod retry;

use std::sync::Arc;

use thiserror::Error;

pub use in_memory::{InMemoryBeginner, InMemoryUnit};
pub use postgres::{PgBeginner, PgUnit};
pub use retry::{run_in_tx, RetrySettings, UnitFuture, DEFAULT_ATTEMPTS};

/// Transaction lifecycle error.
///
/// `ConcurrentTransaction` is the only retryable condition; it is what the
/// backend reports when a serializable transaction loses a read/write or
/// write/write race, and what [`run_in_tx`] returns once it runs out of
/// attempts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("failed to begin transaction: {0}")]
    Begin(String),

    #[error("concurrent transaction")]
    ConcurrentTransaction,

    #[error("failed to commit transaction: {0}")]
    Commit(String),

    #[error("failed to roll back transaction: {0}")]
    Rollback(String),

    /// The caller's deadline elapsed while a step was in flight.
    #[error("transaction cancelled: {0}")]
    Cancelled(String),

    /// A write was attempted through a no-op unit.
    #[error("unit is read-only")]
    ReadOnly,

    /// The unit was used after commit or rollback.
    #[error("unit already finished")]
    Finished,

    #[error("database error: {0}")]
    Database(String),
}

impl TxError {
    /// Whether this error is the serializable-conflict signal.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentTransaction)
    }
}

/// Handle over one logical transaction (or a no-op stand-in).
#[async_trait::async_trait]
pub trait Unit: Send {
    /// `true` for units created by [`Beginner::begin_tx`].
    fn is_transactional(&self) -> bool;

    /// Commit. A no-op unit or an already-finished unit returns `Ok(())`.
    async fn commit(&mut self) -> Result<(), TxError>;

    /// Roll back. Safe to call on a unit the backend already terminated.
    async fn rollback(&mut self) -> Result<(), TxError>;
}

/// Capability exposed by a storage backend to open units of work.
#[async_trait::async_trait]
pub trait Beginner: Send + Sync {
    type Unit: Unit + 'static;

    /// Open a serializable transaction.
    async fn begin_tx(&self) -> Result<Self::Unit, TxError>;

    /// A unit whose commit/rollback are no-ops.
    fn no_tx(&self) -> Self::Unit;
}

#[async_trait::async_trait]
impl<B> Beginner for Arc<B>
where
    B: Beginner + ?Sized,
{
    type Unit = B::Unit;

    async fn begin_tx(&self) -> Result<Self::Unit, TxError> {
        (**self).begin_tx().await
    }

    fn no_tx(&self) -> Self::Unit {
        (**self).no_tx()
    }
}
