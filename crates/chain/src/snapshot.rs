//! Durable form of a [`LedgerEngine`].
use std::sync::Arc;

use crate::{LedgerEngine, LedgerParams, LocalChain, SpkOwner, TxRecord, TxStore};
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxOut};
use serde::{Deserialize, Serialize};
use tally_core::{Label, TxOrigin};

/// A recorded transaction without its derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// How it entered the ledger.
    pub origin: TxOrigin,
    /// Logical last seen time.
    pub last_seen: u64,
    /// Fee as computed on acceptance.
    pub fee: Option<Amount>,
}

/// Everything needed to rebuild a [`LedgerEngine`]. Record states are not stored; they are
/// derived again on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Engine parameters.
    pub params: LedgerParams,
    /// The tracked chain.
    pub chain: LocalChain,
    /// Every record ordered by `last_seen`.
    pub records: Vec<RecordSnapshot>,
    /// Floating txouts.
    pub txouts: Vec<(OutPoint, TxOut)>,
    /// Owned scripts.
    pub spks: Vec<(ScriptBuf, SpkOwner)>,
    /// Known labels, including those without scripts.
    pub labels: Vec<Label>,
    /// The logical clock.
    pub clock: u64,
}

impl LedgerEngine {
    /// Take a snapshot of the engine.
    pub fn snapshot(&self) -> Snapshot {
        let mut records = self
            .store()
            .iter()
            .map(|record| RecordSnapshot {
                tx: record.tx().clone(),
                origin: record.origin().clone(),
                last_seen: record.last_seen(),
                fee: record.fee(),
            })
            .collect::<Vec<_>>();
        records.sort_by_key(|r| (r.last_seen, r.tx.compute_txid()));
        Snapshot {
            params: *self.params(),
            chain: self.chain().clone(),
            records,
            txouts: self
                .store()
                .floating_txouts()
                .map(|(op, txout)| (op, txout.clone()))
                .collect(),
            spks: self
                .label_index()
                .all_spks()
                .map(|(spk, owner)| (spk.to_owned(), owner.clone()))
                .collect(),
            labels: self.label_index().labels().cloned().collect(),
            clock: self.clock,
        }
    }

    /// Rebuild an engine from `snapshot`, deriving every record state again.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut store = TxStore::default();
        for (outpoint, txout) in snapshot.txouts {
            store.insert_txout(outpoint, txout);
        }
        let txids = snapshot
            .records
            .iter()
            .map(|r| r.tx.compute_txid())
            .collect::<Vec<_>>();
        for r in snapshot.records {
            store.insert(TxRecord::new(r.tx, r.origin, r.last_seen, r.fee));
        }

        let mut engine = LedgerEngine {
            chain: snapshot.chain,
            ..LedgerEngine::new(snapshot.params)
        };
        engine.store = store;
        engine.clock = snapshot.clock;
        for label in snapshot.labels {
            engine.index.insert_label(label);
        }
        for (spk, owner) in snapshot.spks {
            engine.index.insert_spk(spk, owner.label, owner.keychain);
        }
        engine.reconcile(txids);
        engine
    }
}
