//! The [`LedgerEngine`]: ingestion of transactions and chain events, and every query over the
//! resulting state.
use std::sync::Arc;

use crate::balance::signed_confirmations;
use crate::canonical::Canonicalizer;
use crate::collections::*;
use crate::{
    ChainChange, ChainView, ConflictDetector, InconsistentChainEvent, InvalidInput,
    LabelBalanceAggregator, LabelIndex, LedgerParams, LocalChain, NotFound, TxRecord, TxStore,
    UtxoMode, UtxoView,
};
use bitcoin::{Amount, OutPoint, ScriptBuf, SignedAmount, Transaction, TxOut, Txid};
use log::{debug, info, trace};
use tally_core::{
    to_signed, BlockId, ChainEvent, KeychainKind, Label, LabelFilter, TxOrigin, TxState,
};

/// Result of [`LedgerEngine::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// The transaction was recorded.
    New(Txid),
    /// A record already existed. Nothing changed.
    AlreadyKnown(Txid),
}

impl Accepted {
    /// The txid of the accepted transaction.
    pub fn txid(&self) -> Txid {
        match self {
            Accepted::New(txid) | Accepted::AlreadyKnown(txid) => *txid,
        }
    }

    /// Whether the transaction was new to the ledger.
    pub fn is_new(&self) -> bool {
        matches!(self, Accepted::New(_))
    }
}

/// What applying a [`ChainEvent`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// The chain change, or `None` if the event was a replay.
    pub change: Option<ChainChange>,
    /// Records whose state changed, with their new state.
    pub transitions: BTreeMap<Txid, TxState>,
    /// Records removed from the ledger.
    pub evicted: BTreeSet<Txid>,
}

impl EventOutcome {
    /// Whether the event was already applied before.
    pub fn is_replay(&self) -> bool {
        self.change.is_none()
    }
}

/// The wallet transaction ledger.
///
/// The engine records transactions, tracks the best chain through [`ChainEvent`]s and keeps the
/// state of every record consistent with both. Conflicting records coexist; at most one record
/// per spent outpoint is ever canonical.
///
/// Every mutation validates its input first and only then applies it, so a failed call leaves the
/// engine untouched. For concurrent use wrap the engine in a [`SharedLedger`].
///
/// [`SharedLedger`]: crate::SharedLedger
#[derive(Debug, Clone)]
pub struct LedgerEngine {
    pub(crate) params: LedgerParams,
    pub(crate) store: TxStore,
    pub(crate) chain: LocalChain,
    pub(crate) index: LabelIndex,
    /// Logical clock used for `last_seen`.
    pub(crate) clock: u64,
}

impl LedgerEngine {
    /// Create an empty ledger.
    pub fn new(params: LedgerParams) -> Self {
        Self {
            chain: LocalChain::from_genesis(params.genesis),
            params,
            store: TxStore::default(),
            index: LabelIndex::default(),
            clock: 0,
        }
    }

    /// The parameters the ledger was created with.
    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// The record store.
    pub fn store(&self) -> &TxStore {
        &self.store
    }

    /// The tracked best chain.
    pub fn chain(&self) -> &LocalChain {
        &self.chain
    }

    /// The index of owned scripts.
    pub fn label_index(&self) -> &LabelIndex {
        &self.index
    }

    /// Adds an owned script under `label`. See [`LabelIndex::insert_spk`].
    pub fn insert_spk(&mut self, spk: ScriptBuf, label: Label, keychain: KeychainKind) -> bool {
        self.index.insert_spk(spk, label, keychain)
    }

    /// Moves an owned script to another label. See [`LabelIndex::set_label`].
    pub fn set_label(&mut self, spk: &bitcoin::Script, label: Label) -> Option<Label> {
        self.index.set_label(spk, label)
    }

    /// Makes a prevout known to the ledger without its transaction.
    ///
    /// Returns `false` if the output was already known.
    pub fn insert_txout(&mut self, outpoint: OutPoint, txout: TxOut) -> bool {
        let inserted = self.store.insert_txout(outpoint, txout);
        if inserted {
            trace!("inserted floating txout {}", outpoint);
        }
        inserted
    }

    /// Whether `tx` pays to or spends from an owned script.
    pub fn is_relevant(&self, tx: &Transaction) -> bool {
        if self.index.pays_to_owned(tx) {
            return true;
        }
        !tx.is_coinbase()
            && tx.input.iter().any(|txin| {
                self.store
                    .get_txout(txin.previous_output)
                    .map_or(false, |txout| self.index.is_mine(&txout.script_pubkey))
            })
    }

    /// Records a transaction.
    ///
    /// Every input of a non-coinbase transaction must spend an output the ledger can resolve,
    /// otherwise [`InvalidInput`] is returned. Accepting a known transaction again returns
    /// [`Accepted::AlreadyKnown`] and changes nothing.
    ///
    /// A newly accepted transaction is `Confirmed` if the best chain already includes it.
    /// Otherwise it is pending and, being the most recently seen, wins over pending conflicts.
    ///
    /// The `from` label of a wallet origin is registered if the index does not know it.
    pub fn accept<T>(&mut self, tx: T, origin: TxOrigin) -> Result<Accepted, InvalidInput>
    where
        T: Into<Arc<Transaction>>,
    {
        let tx: Arc<Transaction> = tx.into();
        let txid = tx.compute_txid();
        if self.store.contains(txid) {
            trace!("{} is already known", txid);
            return Ok(Accepted::AlreadyKnown(txid));
        }
        if !tx.is_coinbase() {
            for (vin, txin) in tx.input.iter().enumerate() {
                if self.store.get_txout(txin.previous_output).is_none() {
                    debug!(
                        "rejecting {}: input {} spends unknown {}",
                        txid, vin, txin.previous_output
                    );
                    return Err(InvalidInput {
                        txid,
                        vin,
                        outpoint: txin.previous_output,
                    });
                }
            }
        }

        // the debit label must be listed even if no script carries it yet
        if let TxOrigin::Wallet { from } = &origin {
            if self.index.insert_label(from.clone()) {
                debug!("registered label {} charged by {}", from, txid);
            }
        }
        let fee = self.store.calculate_fee(&tx);
        let last_seen = self.tick();
        self.store.insert(TxRecord::new(tx, origin.clone(), last_seen, fee));
        info!("accepted {} ({:?})", txid, origin);

        self.reconcile([txid]);
        Ok(Accepted::New(txid))
    }

    /// Applies a block connect or disconnect.
    ///
    /// Records included in a connected block become `Confirmed` and win over all of their
    /// conflicts. Records confirmed in a disconnected block return to pending, except for
    /// coinbase records which are evicted along with their descendants.
    pub fn on_chain_event(
        &mut self,
        event: &ChainEvent,
    ) -> Result<EventOutcome, InconsistentChainEvent> {
        let change = match self.chain.apply_event(event, self.params.max_reorg_depth)? {
            Some(change) => change,
            None => {
                trace!("replayed chain event for {}", event.block());
                return Ok(EventOutcome::default());
            }
        };

        let mut seeds = change
            .txids()
            .iter()
            .chain(event.txids())
            .copied()
            .filter(|txid| self.store.contains(*txid))
            .collect::<BTreeSet<_>>();
        let mut evicted = BTreeSet::new();

        match &change {
            ChainChange::Connected { block, txids } => {
                info!("connected {} with {} txs", block, txids.len());
            }
            ChainChange::Disconnected { block, .. } => {
                info!("disconnected {}", block);
                let coinbases = seeds
                    .iter()
                    .copied()
                    .filter(|txid| self.store.get(*txid).map_or(false, |r| r.is_coinbase()))
                    .collect::<Vec<_>>();
                let mut neighbours = BTreeSet::new();
                for txid in coinbases {
                    let (removed, conflicts) = self.remove_with_descendants(txid);
                    neighbours.extend(conflicts);
                    evicted.extend(removed);
                }
                seeds.retain(|txid| !evicted.contains(txid));

                // the remaining txs re-enter the mempool
                let last_seen = self.tick();
                for txid in &seeds {
                    if let Some(record) = self.store.get_mut(*txid) {
                        record.set_last_seen(last_seen);
                    }
                }
                seeds.extend(neighbours);
                seeds.retain(|txid| !evicted.contains(txid));
            }
        }

        let transitions = self.reconcile(seeds);
        Ok(EventOutcome {
            change: Some(change),
            transitions,
            evicted,
        })
    }

    /// Evicts conflicted records whose winner has more than `max_reorg_depth` confirmations, as
    /// no reorg the ledger accepts can revive them. Descendants are evicted too.
    pub fn prune_final_conflicts(&mut self) -> BTreeSet<Txid> {
        let depth = self.params.max_reorg_depth as i64;
        let finalized = self
            .store
            .iter()
            .filter(|record| record.state().is_conflicted())
            .filter(|record| {
                signed_confirmations(&self.store, &self.chain, record.state()) < -depth
            })
            .map(|record| record.txid())
            .collect::<Vec<_>>();

        let mut evicted = BTreeSet::new();
        let mut seeds = BTreeSet::new();
        for txid in finalized {
            if evicted.contains(&txid) {
                continue;
            }
            let (removed, neighbours) = self.remove_with_descendants(txid);
            evicted.extend(removed);
            seeds.extend(neighbours);
        }
        seeds.retain(|txid| !evicted.contains(txid));
        self.reconcile(seeds);
        if !evicted.is_empty() {
            info!("pruned {} final conflicts", evicted.len());
        }
        evicted
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Removes `txid` and its descendants. Returns the removed txids and the records that
    /// conflicted with any removed record.
    fn remove_with_descendants(&mut self, txid: Txid) -> (Vec<Txid>, BTreeSet<Txid>) {
        let detector = ConflictDetector::new(&self.store);
        let mut to_remove = vec![txid];
        to_remove.extend(detector.walk_descendants(txid, |_, txid| Some(txid)));
        let mut neighbours = BTreeSet::new();
        for txid in &to_remove {
            if let Some(record) = self.store.get(*txid) {
                neighbours.extend(detector.direct_conflicts(record.tx()).map(|(_, c)| c));
            }
        }

        for txid in &to_remove {
            if self.store.remove(*txid).is_some() {
                debug!("evicted {}", txid);
            }
        }
        neighbours.retain(|txid| self.store.contains(*txid));
        (to_remove, neighbours)
    }

    /// Re-derives the state of every record in the conflict cluster around `seeds`.
    pub(crate) fn reconcile<I>(&mut self, seeds: I) -> BTreeMap<Txid, TxState>
    where
        I: IntoIterator<Item = Txid>,
    {
        let cluster = ConflictDetector::new(&self.store).cluster(seeds);
        if cluster.is_empty() {
            return BTreeMap::new();
        }
        let resolved = Canonicalizer::new(&self.store, &self.chain).resolve(&cluster);

        let mut transitions = BTreeMap::new();
        for (txid, state) in resolved {
            if let Some(record) = self.store.get_mut(txid) {
                if record.state() != state {
                    debug!("{}: {} -> {}", txid, record.state(), state);
                    record.set_state(state);
                    transitions.insert(txid, state);
                }
            }
        }
        transitions
    }

    /// Get the record of `txid`.
    pub fn record(&self, txid: Txid) -> Result<&TxRecord, NotFound> {
        self.store.get(txid).ok_or(NotFound::Tx(txid))
    }

    /// The state of `txid`.
    pub fn state(&self, txid: Txid) -> Result<TxState, NotFound> {
        self.record(txid).map(|record| record.state())
    }

    /// Signed confirmation count of `txid`.
    ///
    /// Positive when confirmed, zero while pending, and minus the winner's count when
    /// conflicted.
    pub fn confirmations(&self, txid: Txid) -> Result<i64, NotFound> {
        let state = self.state(txid)?;
        Ok(signed_confirmations(&self.store, &self.chain, state))
    }

    /// Every record conflicting with `txid`, including descendants of direct conflicts.
    pub fn find_conflicts(&self, txid: Txid) -> Result<BTreeSet<Txid>, NotFound> {
        let record = self.record(txid)?;
        Ok(ConflictDetector::new(&self.store).find_conflicts(record.tx()))
    }

    /// Index of the first output of `txid` paying exactly `amount`.
    pub fn find_output(&self, txid: Txid, amount: Amount) -> Result<u32, NotFound> {
        self.record(txid)?
            .outputs()
            .find(|(_, txout)| txout.value == amount)
            .map(|(op, _)| op.vout)
            .ok_or(NotFound::Output { txid, amount })
    }

    /// Fee paid by `txid`, if every spent output is known.
    pub fn fee(&self, txid: Txid) -> Result<Option<Amount>, NotFound> {
        let record = self.record(txid)?;
        Ok(record
            .fee()
            .or_else(|| self.store.calculate_fee(record.tx())))
    }

    /// Owned outputs created minus owned outputs spent by `txid`.
    pub fn net_amount(&self, txid: Txid) -> Result<SignedAmount, NotFound> {
        let record = self.record(txid)?;
        let aggregator = self.aggregator();
        Ok(to_signed(aggregator.credit(record)) - to_signed(aggregator.debit(record)))
    }

    /// Owned outputs spent by `txid`.
    pub fn debit(&self, txid: Txid) -> Result<Amount, NotFound> {
        Ok(self.aggregator().debit(self.record(txid)?))
    }

    /// Owned outputs created by `txid`.
    pub fn credit(&self, txid: Txid) -> Result<Amount, NotFound> {
        Ok(self.aggregator().credit(self.record(txid)?))
    }

    /// A view of unspent outputs.
    pub fn utxo_view(&self, mode: UtxoMode) -> UtxoView<'_, LocalChain> {
        UtxoView::new(&self.store, &self.chain, &self.index, mode)
    }

    fn aggregator(&self) -> LabelBalanceAggregator<'_, LocalChain> {
        LabelBalanceAggregator::new(
            &self.store,
            &self.chain,
            &self.index,
            self.params.coinbase_maturity,
        )
    }

    /// Balance of the labels matched by `filter` counting records with at least `min_conf`
    /// confirmations.
    pub fn balance(&self, filter: &LabelFilter, min_conf: u32) -> Result<SignedAmount, NotFound> {
        self.aggregator().balance(filter, min_conf)
    }

    /// Balance of every known label.
    pub fn balances_by_label(&self, min_conf: u32) -> BTreeMap<Label, SignedAmount> {
        self.aggregator().by_label(min_conf)
    }

    /// Every known label.
    pub fn labels(&self) -> impl ExactSizeIterator<Item = &Label> + '_ {
        self.index.labels()
    }

    /// The tip of the tracked chain.
    pub fn tip(&self) -> BlockId {
        self.chain.tip()
    }
}
