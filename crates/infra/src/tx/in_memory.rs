//! In-memory transactional state.
//!
//! Intended for tests/dev. Not optimized for performance: every real unit
//! works on a private copy of the whole state.
//!
//! Commit uses first-committer-wins validation: a unit that wrote something
//! and whose base version is no longer current fails with
//! [`TxError::ConcurrentTransaction`], which is how a serializable database
//! reports a lost read/write race.

use std::sync::{Arc, PoisonError, RwLock};

use super::{Beginner, TxError, Unit};

#[derive(Debug)]
struct Versioned<S> {
    version: u64,
    state: S,
}

/// Shared, versioned state that hands out [`InMemoryUnit`]s.
#[derive(Debug)]
pub struct InMemoryBeginner<S> {
    shared: Arc<RwLock<Versioned<S>>>,
}

impl<S> Clone for InMemoryBeginner<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> InMemoryBeginner<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(state: S) -> Self {
        Self {
            shared: Arc::new(RwLock::new(Versioned { version: 0, state })),
        }
    }

    /// Copy of the last committed state.
    pub fn snapshot(&self) -> Result<S, TxError> {
        self.read().map(|(_, state)| state)
    }

    /// Number of write commits so far.
    pub fn version(&self) -> Result<u64, TxError> {
        self.read().map(|(version, _)| version)
    }

    fn read(&self) -> Result<(u64, S), TxError> {
        let guard = self
            .shared
            .read()
            .map_err(|_| TxError::Database("lock poisoned".to_string()))?;
        Ok((guard.version, guard.state.clone()))
    }

    fn begin(&self) -> Result<InMemoryUnit<S>, TxError> {
        let (base_version, working) = self.read()?;
        Ok(InMemoryUnit {
            shared: self.shared.clone(),
            base_version,
            working,
            kind: UnitKind::Transaction,
            dirty: false,
            finished: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    Transaction,
    NoTx,
}

/// A unit over [`InMemoryBeginner`] state.
///
/// Reads see the state as of `begin`. Writes stay private until commit;
/// dropping an unfinished unit discards them, which is its rollback.
#[derive(Debug)]
pub struct InMemoryUnit<S> {
    shared: Arc<RwLock<Versioned<S>>>,
    base_version: u64,
    working: S,
    kind: UnitKind,
    dirty: bool,
    finished: bool,
}

impl<S> InMemoryUnit<S> {
    pub fn state(&self) -> &S {
        &self.working
    }

    /// Mutable access for writes. Fails on a no-op unit or a finished unit.
    pub fn state_mut(&mut self) -> Result<&mut S, TxError> {
        if self.kind == UnitKind::NoTx {
            return Err(TxError::ReadOnly);
        }
        if self.finished {
            return Err(TxError::Finished);
        }
        self.dirty = true;
        Ok(&mut self.working)
    }
}

#[async_trait::async_trait]
impl<S> Unit for InMemoryUnit<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn is_transactional(&self) -> bool {
        self.kind == UnitKind::Transaction
    }

    async fn commit(&mut self) -> Result<(), TxError> {
        if self.kind == UnitKind::NoTx || self.finished {
            return Ok(());
        }
        self.finished = true;
        if !self.dirty {
            return Ok(());
        }

        let mut guard = self
            .shared
            .write()
            .map_err(|_| TxError::Commit("lock poisoned".to_string()))?;
        if guard.version != self.base_version {
            return Err(TxError::ConcurrentTransaction);
        }
        guard.state = self.working.clone();
        guard.version += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TxError> {
        self.finished = true;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S> Beginner for InMemoryBeginner<S>
where
    S: Clone + Send + Sync + 'static,
{
    type Unit = InMemoryUnit<S>;

    async fn begin_tx(&self) -> Result<InMemoryUnit<S>, TxError> {
        self.begin().map_err(|e| TxError::Begin(e.to_string()))
    }

    fn no_tx(&self) -> InMemoryUnit<S> {
        let guard = self.shared.read().unwrap_or_else(PoisonError::into_inner);
        InMemoryUnit {
            shared: self.shared.clone(),
            base_version: guard.version,
            working: guard.state.clone(),
            kind: UnitKind::NoTx,
            dirty: false,
            finished: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let db = InMemoryBeginner::new(vec![1]);
        let mut unit = db.begin_tx().await.unwrap();
        unit.state_mut().unwrap().push(2);

        assert_eq!(db.snapshot().unwrap(), vec![1]);
        unit.commit().await.unwrap();
        assert_eq!(db.snapshot().unwrap(), vec![1, 2]);
        assert_eq!(db.version().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_writer_on_stale_base_conflicts() {
        let db = InMemoryBeginner::new(0i32);
        let mut a = db.begin_tx().await.unwrap();
        let mut b = db.begin_tx().await.unwrap();

        *a.state_mut().unwrap() += 1;
        *b.state_mut().unwrap() += 2;

        a.commit().await.unwrap();
        assert_eq!(b.commit().await, Err(TxError::ConcurrentTransaction));
        assert_eq!(db.snapshot().unwrap(), 1);
    }

    #[tokio::test]
    async fn read_only_unit_commits_despite_concurrent_write() {
        let db = InMemoryBeginner::new(0i32);
        let reader = db.begin_tx().await.unwrap();
        let mut writer = db.begin_tx().await.unwrap();
        *writer.state_mut().unwrap() = 4;
        writer.commit().await.unwrap();

        let mut reader = reader;
        assert_eq!(*reader.state(), 0);
        assert!(reader.commit().await.is_ok());
    }

    #[tokio::test]
    async fn no_tx_unit_rejects_writes_and_ignores_termination() {
        let db = InMemoryBeginner::new(3u8);
        let mut unit = db.no_tx();

        assert!(!unit.is_transactional());
        assert_eq!(*unit.state(), 3);
        assert_eq!(unit.state_mut().unwrap_err(), TxError::ReadOnly);
        assert!(unit.commit().await.is_ok());
        assert!(unit.rollback().await.is_ok());
    }

    #[tokio::test]
    async fn termination_is_idempotent() {
        let db = InMemoryBeginner::new(0u8);
        let mut unit = db.begin_tx().await.unwrap();
        *unit.state_mut().unwrap() = 1;

        unit.rollback().await.unwrap();
        assert!(unit.commit().await.is_ok());
        assert!(unit.rollback().await.is_ok());
        assert_eq!(unit.state_mut().unwrap_err(), TxError::Finished);
        assert_eq!(db.snapshot().unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_unit_discards_writes() {
        let db = InMemoryBeginner::new(0u8);
        {
            let mut unit = db.begin_tx().await.unwrap();
            *unit.state_mut().unwrap() = 9;
        }
        assert_eq!(db.snapshot().unwrap(), 0);
    }
}
