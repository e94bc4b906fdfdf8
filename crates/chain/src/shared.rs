//! A [`LedgerEngine`] handle that can be shared between threads.
use std::sync::Arc;

use crate::{
    Accepted, EventOutcome, InconsistentChainEvent, InvalidInput, LedgerEngine, NotFound,
};
use bitcoin::{OutPoint, SignedAmount, Transaction, TxOut, Txid};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tally_core::{ChainEvent, LabelFilter, TxOrigin};

/// A cloneable, thread-safe handle to a [`LedgerEngine`].
///
/// Mutations hold the write lock for the whole validate-and-apply step and queries hold the read
/// lock, so a reader never observes a partially applied transition.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<LedgerEngine>>,
}

impl SharedLedger {
    /// Wrap `engine`.
    pub fn new(engine: LedgerEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Lock for reading. Several readers may hold the lock at once.
    pub fn read(&self) -> RwLockReadGuard<'_, LedgerEngine> {
        self.inner.read()
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, LedgerEngine> {
        self.inner.write()
    }

    /// See [`LedgerEngine::accept`].
    pub fn accept<T>(&self, tx: T, origin: TxOrigin) -> Result<Accepted, InvalidInput>
    where
        T: Into<Arc<Transaction>>,
    {
        self.inner.write().accept(tx, origin)
    }

    /// See [`LedgerEngine::on_chain_event`].
    pub fn on_chain_event(
        &self,
        event: &ChainEvent,
    ) -> Result<EventOutcome, InconsistentChainEvent> {
        self.inner.write().on_chain_event(event)
    }

    /// See [`LedgerEngine::insert_txout`].
    pub fn insert_txout(&self, outpoint: OutPoint, txout: TxOut) -> bool {
        self.inner.write().insert_txout(outpoint, txout)
    }

    /// See [`LedgerEngine::confirmations`].
    pub fn confirmations(&self, txid: Txid) -> Result<i64, NotFound> {
        self.inner.read().confirmations(txid)
    }

    /// See [`LedgerEngine::balance`].
    pub fn balance(&self, filter: &LabelFilter, min_conf: u32) -> Result<SignedAmount, NotFound> {
        self.inner.read().balance(filter, min_conf)
    }

    /// Consume the handle and return the engine if this is the last handle.
    pub fn try_into_inner(self) -> Result<LedgerEngine, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }
}

impl From<LedgerEngine> for SharedLedger {
    fn from(engine: LedgerEngine) -> Self {
        Self::new(engine)
    }
}
