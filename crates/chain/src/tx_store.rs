//! The store of [`TxRecord`]s and the spend index over them.
//!
//! Conflicting records coexist in a [`TxStore`]. The store indexes every outpoint spent by a
//! record so conflicts and descendants can be traversed, see [`ConflictDetector`].
//!
//! [`ConflictDetector`]: crate::ConflictDetector
use crate::collections::*;
use bitcoin::{Amount, OutPoint, Transaction, TxOut, Txid};
use core::ops::RangeInclusive;
use std::sync::Arc;
use tally_core::{TxOrigin, TxState};

/// A transaction known to the ledger together with its derived state.
///
/// The transaction itself never changes once recorded. Only [`state`] and [`last_seen`] move.
///
/// [`state`]: Self::state
/// [`last_seen`]: Self::last_seen
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TxRecord {
    txid: Txid,
    tx: Arc<Transaction>,
    origin: TxOrigin,
    state: TxState,
    last_seen: u64,
    fee: Option<Amount>,
}

impl TxRecord {
    pub(crate) fn new(
        tx: Arc<Transaction>,
        origin: TxOrigin,
        last_seen: u64,
        fee: Option<Amount>,
    ) -> Self {
        Self {
            txid: tx.compute_txid(),
            tx,
            origin,
            state: TxState::Pending,
            last_seen,
            fee,
        }
    }

    /// The txid of the record.
    pub fn txid(&self) -> Txid {
        self.txid
    }

    /// The recorded transaction.
    pub fn tx(&self) -> &Arc<Transaction> {
        &self.tx
    }

    /// How the transaction entered the ledger.
    pub fn origin(&self) -> &TxOrigin {
        &self.origin
    }

    /// The current derived state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Logical time at which the record was last accepted or returned to the mempool. Higher means
    /// more recent.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// The fee paid, as computed when the record was accepted. Zero for a coinbase and `None` if
    /// a spent output was unknown at that time.
    pub fn fee(&self) -> Option<Amount> {
        self.fee
    }

    /// Whether the transaction is a coinbase.
    pub fn is_coinbase(&self) -> bool {
        self.tx.is_coinbase()
    }

    /// Outpoints spent by the record. Empty for a coinbase.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        let coinbase = self.is_coinbase();
        self.tx
            .input
            .iter()
            .filter(move |_| !coinbase)
            .map(|txin| txin.previous_output)
    }

    /// Outputs created by the record.
    pub fn outputs(&self) -> impl Iterator<Item = (OutPoint, &TxOut)> + '_ {
        let txid = self.txid;
        self.tx
            .output
            .iter()
            .enumerate()
            .map(move |(vout, txout)| (OutPoint::new(txid, vout as u32), txout))
    }

    pub(crate) fn set_state(&mut self, state: TxState) {
        self.state = state;
    }

    pub(crate) fn set_last_seen(&mut self, last_seen: u64) {
        self.last_seen = last_seen;
    }
}

/// Transactions known to the ledger, indexed by txid and by the outpoints they spend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxStore {
    records: HashMap<Txid, TxRecord>,
    spends: BTreeMap<OutPoint, HashSet<Txid>>,
    txouts: BTreeMap<OutPoint, TxOut>,
    empty_outspends: HashSet<Txid>,
}

impl TxStore {
    /// Get a record by txid.
    pub fn get(&self, txid: Txid) -> Option<&TxRecord> {
        self.records.get(&txid)
    }

    /// Whether a record exists for `txid`.
    pub fn contains(&self, txid: Txid) -> bool {
        self.records.contains_key(&txid)
    }

    /// Iterate over all records in arbitrary order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TxRecord> + '_ {
        self.records.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolve the output at `outpoint`.
    ///
    /// This looks at recorded transactions first and then at floating txouts inserted with
    /// [`insert_txout`](Self::insert_txout).
    pub fn get_txout(&self, outpoint: OutPoint) -> Option<&TxOut> {
        match self.records.get(&outpoint.txid) {
            Some(record) => record.tx.output.get(outpoint.vout as usize),
            None => self.txouts.get(&outpoint),
        }
    }

    /// Floating txouts, that is outputs whose transaction is not recorded.
    pub fn floating_txouts(&self) -> impl Iterator<Item = (OutPoint, &TxOut)> + '_ {
        self.txouts.iter().map(|(op, txout)| (*op, txout))
    }

    /// The records spending `outpoint`. More than one means they conflict.
    pub fn outspends(&self, outpoint: OutPoint) -> &HashSet<Txid> {
        self.spends.get(&outpoint).unwrap_or(&self.empty_outspends)
    }

    /// Iterates over the records spending outputs of `txid` as `(vout, spenders)`.
    pub fn tx_outspends(
        &self,
        txid: Txid,
    ) -> impl DoubleEndedIterator<Item = (u32, &HashSet<Txid>)> + '_ {
        self.spends
            .range(tx_outpoint_range(txid))
            .map(|(outpoint, spends)| (outpoint.vout, spends))
    }

    /// In-store parents of `txid`.
    pub fn parents(&self, txid: Txid) -> BTreeSet<Txid> {
        self.records
            .get(&txid)
            .into_iter()
            .flat_map(|record| record.spent_outpoints())
            .map(|op| op.txid)
            .filter(|parent| self.records.contains_key(parent))
            .collect()
    }

    /// Calculates the fee of `tx`. Returns zero for a coinbase.
    ///
    /// Returns `None` if any spent output cannot be resolved, if a sum overflows, or if the
    /// outputs exceed the inputs. `tx` does not have to be recorded.
    pub fn calculate_fee(&self, tx: &Transaction) -> Option<Amount> {
        if tx.is_coinbase() {
            return Some(Amount::ZERO);
        }
        let inputs_sum = tx.input.iter().try_fold(Amount::ZERO, |sum, txin| {
            sum.checked_add(self.get_txout(txin.previous_output)?.value)
        })?;
        let outputs_sum = tx
            .output
            .iter()
            .try_fold(Amount::ZERO, |sum, txout| sum.checked_add(txout.value))?;
        inputs_sum.checked_sub(outputs_sum)
    }

    /// Inserts a floating txout. Returns `false` if the output is already known.
    pub(crate) fn insert_txout(&mut self, outpoint: OutPoint, txout: TxOut) -> bool {
        if self.get_txout(outpoint).is_some() {
            return false;
        }
        self.txouts.insert(outpoint, txout);
        true
    }

    pub(crate) fn insert(&mut self, record: TxRecord) {
        let txid = record.txid;
        for outpoint in record.spent_outpoints() {
            self.spends.entry(outpoint).or_default().insert(txid);
        }
        // a recorded transaction supersedes floating txouts of the same txid
        let floating = self
            .txouts
            .range(tx_outpoint_range(txid))
            .map(|(op, _)| *op)
            .collect::<Vec<_>>();
        for op in floating {
            self.txouts.remove(&op);
        }
        self.records.insert(txid, record);
    }

    pub(crate) fn get_mut(&mut self, txid: Txid) -> Option<&mut TxRecord> {
        self.records.get_mut(&txid)
    }

    /// Removes a single record and unindexes its spends.
    pub(crate) fn remove(&mut self, txid: Txid) -> Option<TxRecord> {
        let record = self.records.remove(&txid)?;
        for outpoint in record.spent_outpoints() {
            if let btree_map::Entry::Occupied(mut entry) = self.spends.entry(outpoint) {
                entry.get_mut().remove(&txid);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
        Some(record)
    }
}

fn tx_outpoint_range(txid: Txid) -> RangeInclusive<OutPoint> {
    OutPoint::new(txid, u32::MIN)..=OutPoint::new(txid, u32::MAX)
}

#[cfg(test)]
mod test {
    use super::*;
    use bitcoin::{absolute, hashes::Hash, transaction, ScriptBuf, TxIn};

    fn tx(inputs: &[OutPoint], values: &[u64]) -> Transaction {
        Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: inputs
                .iter()
                .map(|op| TxIn {
                    previous_output: *op,
                    ..Default::default()
                })
                .collect(),
            output: values
                .iter()
                .map(|v| TxOut {
                    value: Amount::from_sat(*v),
                    script_pubkey: ScriptBuf::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn spends_are_indexed_and_unindexed() {
        let mut store = TxStore::default();
        let root = OutPoint::new(Txid::from_byte_array([1; 32]), 0);
        store.insert_txout(
            root,
            TxOut {
                value: Amount::from_sat(1000),
                script_pubkey: ScriptBuf::new(),
            },
        );
        let a = tx(&[root], &[900]);
        let b = tx(&[root], &[800]);
        let a_txid = a.compute_txid();
        let b_txid = b.compute_txid();
        store.insert(TxRecord::new(Arc::new(a.clone()), TxOrigin::Observed, 1, None));
        store.insert(TxRecord::new(Arc::new(b), TxOrigin::Observed, 2, None));

        assert_eq!(store.outspends(root).len(), 2);
        assert_eq!(store.calculate_fee(&a), Some(Amount::from_sat(100)));

        assert!(store.remove(b_txid).is_some());
        assert_eq!(
            store.outspends(root).iter().collect::<Vec<_>>(),
            vec![&a_txid]
        );
        assert!(store.remove(b_txid).is_none());
    }

    #[test]
    fn fee_needs_every_prevout() {
        let store = TxStore::default();
        let unknown = OutPoint::new(Txid::from_byte_array([2; 32]), 0);
        assert_eq!(store.calculate_fee(&tx(&[unknown], &[1])), None);
    }

    #[test]
    fn fee_is_none_when_a_sum_overflows() {
        let mut store = TxStore::default();
        let prevouts = [1_u8, 2].map(|b| OutPoint::new(Txid::from_byte_array([b; 32]), 0));
        for op in prevouts {
            store.insert_txout(
                op,
                TxOut {
                    value: Amount::from_sat(u64::MAX),
                    script_pubkey: ScriptBuf::new(),
                },
            );
        }
        assert_eq!(store.calculate_fee(&tx(&prevouts, &[1])), None);
        assert_eq!(store.calculate_fee(&tx(&prevouts[..1], &[u64::MAX, 1])), None);
        assert_eq!(
            store.calculate_fee(&tx(&prevouts[..1], &[u64::MAX - 7])),
            Some(Amount::from_sat(7))
        );
    }

    #[test]
    fn parents_only_include_recorded_transactions() {
        let mut store = TxStore::default();
        let floating = OutPoint::new(Txid::from_byte_array([3; 32]), 1);
        store.insert_txout(
            floating,
            TxOut {
                value: Amount::from_sat(500),
                script_pubkey: ScriptBuf::new(),
            },
        );
        let parent = tx(&[floating], &[400, 50]);
        let parent_txid = parent.compute_txid();
        store.insert(TxRecord::new(Arc::new(parent), TxOrigin::Observed, 1, None));
        let child = tx(&[OutPoint::new(parent_txid, 1)], &[10]);
        let child_txid = child.compute_txid();
        store.insert(TxRecord::new(Arc::new(child), TxOrigin::Observed, 2, None));

        assert_eq!(
            store.parents(child_txid).into_iter().collect::<Vec<_>>(),
            vec![parent_txid]
        );
        assert_eq!(store.tx_outspends(parent_txid).count(), 1);
    }
}
