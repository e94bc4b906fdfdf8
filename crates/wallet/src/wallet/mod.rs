//! Wallet
//!
//! This module defines the [`Wallet`].

use core::fmt;
use std::sync::Arc;

use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, transaction, Amount, Block, FeeRate, OutPoint, Script, ScriptBuf, Sequence,
    SignedAmount, Transaction, TxIn, TxOut, Txid, WPubkeyHash,
};
use log::{debug, info};
use rand::Rng;
use tally_chain::{
    Accepted, ConflictDetector, EventOutcome, InconsistentChainEvent, InvalidInput, LedgerEngine,
    LocalUtxo, NotFound, UtxoMode,
};
use tally_core::{
    to_signed, BlockId, ChainEvent, KeychainKind, Label, LabelFilter, TxOrigin, TxState,
};

use crate::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use crate::types::*;

pub mod coin_selection;
pub mod error;
mod params;
mod persisted;

pub use error::*;
pub use params::*;
pub use persisted::*;

use coin_selection::Excess;

/// A label-aware wallet.
///
/// The wallet derives its scripts from a seed and groups them under labels. Every transaction it
/// creates or learns about goes through its [`LedgerEngine`], which resolves double-spends and
/// reports confirmations and balances per label.
#[derive(Debug, Clone)]
pub struct Wallet {
    ledger: LedgerEngine,
    seed: [u8; 32],
    next_index: BTreeMap<KeychainKind, u32>,
    fee_rate: FeeRate,
}

fn derive_spk(seed: &[u8; 32], keychain: KeychainKind, index: u32) -> ScriptBuf {
    let mut data = Vec::with_capacity(32 + 1 + 4);
    data.extend_from_slice(seed);
    data.push(keychain.as_byte());
    data.extend_from_slice(&index.to_le_bytes());
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&data))
}

impl Wallet {
    /// Create a new wallet with `params`.
    pub fn create(params: WalletParams) -> Self {
        let seed = params.seed.unwrap_or_else(|| rand::thread_rng().gen());
        Self {
            ledger: LedgerEngine::new(params.ledger),
            seed,
            next_index: BTreeMap::new(),
            fee_rate: params.fee_rate,
        }
    }

    pub(crate) fn from_parts(
        ledger: LedgerEngine,
        seed: [u8; 32],
        next_index: BTreeMap<KeychainKind, u32>,
        fee_rate: FeeRate,
    ) -> Self {
        Self {
            ledger,
            seed,
            next_index,
            fee_rate,
        }
    }

    /// The ledger behind the wallet.
    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    /// The fee rate of created transactions.
    pub fn fee_rate(&self) -> FeeRate {
        self.fee_rate
    }

    /// Change the fee rate of created transactions.
    pub fn set_fee_rate(&mut self, fee_rate: FeeRate) {
        self.fee_rate = fee_rate;
    }

    /// The tip of the chain the wallet follows.
    pub fn tip(&self) -> BlockId {
        self.ledger.tip()
    }

    pub(crate) fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// The next index to be derived for `keychain`.
    pub fn next_derivation_index(&self, keychain: KeychainKind) -> u32 {
        self.next_index.get(&keychain).copied().unwrap_or(0)
    }

    fn reveal_next_spk(&mut self, keychain: KeychainKind, label: Label) -> AddressInfo {
        let index = self.next_derivation_index(keychain);
        self.next_index.insert(keychain, index + 1);
        let script_pubkey = derive_spk(&self.seed, keychain, index);
        self.ledger.insert_spk(script_pubkey.clone(), label.clone(), keychain);
        debug!("revealed {:?} script {} for `{}`", keychain, index, label);
        AddressInfo {
            index,
            script_pubkey,
            keychain,
            label,
        }
    }

    /// Derive a new receiving script under `label`.
    pub fn new_address(&mut self, label: impl Into<Label>) -> AddressInfo {
        self.reveal_next_spk(KeychainKind::External, label.into())
    }

    /// Derive a new change script. Change always belongs to the default label.
    pub fn change_address(&mut self) -> AddressInfo {
        self.reveal_next_spk(KeychainKind::Internal, Label::default())
    }

    /// Return whether or not a `script` is part of this wallet.
    pub fn is_mine(&self, script: &Script) -> bool {
        self.ledger.label_index().is_mine(script)
    }

    /// The label owning `script`.
    pub fn label_of(&self, script: &Script) -> Option<&Label> {
        self.ledger.label_index().label_of(script)
    }

    /// Move an owned script to `label`. Returns the previous label.
    pub fn set_label(&mut self, script: &Script, label: impl Into<Label>) -> Option<Label> {
        self.ledger.set_label(script, label.into())
    }

    /// Every known label.
    pub fn labels(&self) -> impl ExactSizeIterator<Item = &Label> + '_ {
        self.ledger.labels()
    }

    /// Whether a pending record was created by this wallet.
    fn is_trusted(&self, txid: Txid) -> bool {
        self.ledger
            .record(txid)
            .map_or(false, |record| record.origin().is_wallet())
    }

    fn is_spendable(&self, utxo: &LocalUtxo, min_conf: u32) -> bool {
        if utxo.is_coinbase && utxo.confirmations <= self.ledger.params().coinbase_maturity {
            return false;
        }
        match utxo.state {
            Some(TxState::Confirmed(_)) => utxo.confirmations >= min_conf,
            Some(TxState::Pending) => min_conf == 0 || self.is_trusted(utxo.outpoint.txid),
            // floating txouts never credited any label
            Some(TxState::Conflicted(_)) | None => false,
        }
    }

    /// Owned outputs the wallet can spend with at least `min_conf` confirmations.
    ///
    /// Pending outputs of transactions the wallet created are always included.
    pub fn list_unspent(&self, min_conf: u32) -> Vec<LocalUtxo> {
        self.ledger
            .utxo_view(UtxoMode::IncludeUnconfirmed)
            .owned_unspent()
            .into_iter()
            .filter(|utxo| self.is_spendable(utxo, min_conf))
            .collect()
    }

    /// Pay `amount` to `script_pubkey`, charging the payment to `from`.
    ///
    /// The balance of `from` counting transactions with at least `min_conf` confirmations must
    /// cover `amount`. The created transaction is accepted by the ledger right away.
    pub fn send_from(
        &mut self,
        from: impl Into<Label>,
        script_pubkey: ScriptBuf,
        amount: Amount,
        min_conf: u32,
    ) -> Result<Txid, CreateTxError> {
        let from = from.into();
        if amount == Amount::ZERO {
            return Err(CreateTxError::ZeroAmount);
        }
        let available = self
            .ledger
            .balance(&LabelFilter::Only(from.clone()), min_conf)
            .map_err(|_| CreateTxError::UnknownLabel(from.clone()))?;
        if available < to_signed(amount) {
            return Err(CreateTxError::BalanceTooLow {
                label: from,
                needed: amount,
                available,
            });
        }

        let change_spk = derive_spk(
            &self.seed,
            KeychainKind::Internal,
            self.next_derivation_index(KeychainKind::Internal),
        );
        let selection = coin_selection::select_coins(
            self.list_unspent(min_conf),
            &from,
            amount,
            self.fee_rate,
            &change_spk,
        )?;

        let mut output = vec![TxOut {
            value: amount,
            script_pubkey,
        }];
        if let Excess::Change { amount: change, .. } = selection.excess {
            let change_spk = self.change_address().script_pubkey;
            let pos = rand::thread_rng().gen_range(0..=output.len());
            output.insert(
                pos,
                TxOut {
                    value: change,
                    script_pubkey: change_spk,
                },
            );
        }
        let inputs = selection
            .selected
            .iter()
            .map(|utxo| utxo.outpoint)
            .collect::<Vec<_>>();
        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: inputs.iter().copied().map(unsigned_txin).collect(),
            output,
        };

        let txid = self.ledger.accept(tx, TxOrigin::wallet(from.clone()))?.txid();
        info!(
            "sent {} from `{}` in {} ({} inputs, fee {})",
            amount,
            from,
            txid,
            inputs.len(),
            selection.absolute_fee()
        );
        Ok(txid)
    }

    /// Build an unsigned transaction spending `inputs` to `outputs`.
    ///
    /// Nothing is checked or recorded.
    pub fn create_raw_transaction(
        inputs: &[OutPoint],
        outputs: &[(ScriptBuf, Amount)],
    ) -> Transaction {
        Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: inputs.iter().copied().map(unsigned_txin).collect(),
            output: outputs
                .iter()
                .map(|(script_pubkey, value)| TxOut {
                    value: *value,
                    script_pubkey: script_pubkey.clone(),
                })
                .collect(),
        }
    }

    /// Check whether the wallet can sign every input of `tx`.
    ///
    /// No signatures are produced, the transaction is returned unchanged.
    pub fn sign_raw_transaction(&self, tx: Transaction) -> SignedTx {
        let complete = self.is_from_me(&tx);
        SignedTx { tx, complete }
    }

    /// Whether every input of `tx` spends an owned output.
    fn is_from_me(&self, tx: &Transaction) -> bool {
        !tx.is_coinbase()
            && !tx.input.is_empty()
            && tx.input.iter().all(|txin| {
                self.ledger
                    .store()
                    .get_txout(txin.previous_output)
                    .map_or(false, |txout| self.is_mine(&txout.script_pubkey))
            })
    }

    /// Details of the wallet transaction `txid`.
    pub fn get_transaction(&self, txid: Txid) -> Result<WalletTx, NotFound> {
        let record = self.ledger.record(txid)?;
        let tx = record.tx().clone();
        let from_me = self.is_from_me(&tx);

        let net = self.ledger.net_amount(txid)?;
        let fee = if from_me { self.ledger.fee(txid)? } else { None };
        let amount = match fee {
            Some(fee) => net + to_signed(fee),
            None => net,
        };
        let signed_fee = fee.map(|fee| -to_signed(fee));

        let conflicts = ConflictDetector::new(self.ledger.store())
            .direct_conflicts(&tx)
            .map(|(_, txid)| txid)
            .collect::<BTreeSet<_>>();

        let debit_label = record.origin().debit_label();
        let index = self.ledger.label_index();
        let mut details = Vec::new();
        for (outpoint, txout) in record.outputs() {
            let owner = index.owner(&txout.script_pubkey);
            if from_me && owner.map_or(false, |o| o.keychain == KeychainKind::Internal) {
                continue;
            }
            let value = to_signed(txout.value);
            if from_me {
                details.push(TxDetail {
                    label: debit_label.clone(),
                    category: Category::Send,
                    amount: -value,
                    vout: outpoint.vout,
                    fee: signed_fee,
                });
            }
            if let Some(owner) = owner {
                details.push(TxDetail {
                    label: owner.label.clone(),
                    category: Category::Receive,
                    amount: value,
                    vout: outpoint.vout,
                    fee: None,
                });
            }
        }

        Ok(WalletTx {
            txid,
            amount,
            fee: signed_fee,
            confirmations: self.ledger.confirmations(txid)?,
            block: record.state().confirmation_block(),
            conflicts: conflicts.into_iter().collect(),
            tx,
            details,
        })
    }

    /// Every wallet transaction, oldest first.
    pub fn list_transactions(&self) -> Vec<WalletTx> {
        let mut records = self.ledger.store().iter().collect::<Vec<_>>();
        records.sort_by_key(|record| (record.last_seen(), record.txid()));
        records
            .into_iter()
            .filter_map(|record| self.get_transaction(record.txid()).ok())
            .collect()
    }

    /// Balance of the labels matched by `filter` counting transactions with at least `min_conf`
    /// confirmations.
    ///
    /// `"*"` matches every label.
    pub fn get_balance(
        &self,
        filter: impl Into<LabelFilter>,
        min_conf: u32,
    ) -> Result<SignedAmount, NotFound> {
        self.ledger.balance(&filter.into(), min_conf)
    }

    /// Confirmed and pending balance of every label.
    pub fn list_balances(&self) -> Vec<LabelBalance> {
        let confirmed = self.ledger.balances_by_label(1);
        let total = self.ledger.balances_by_label(0);
        total
            .into_iter()
            .map(|(label, total)| {
                let confirmed = confirmed
                    .get(&label)
                    .copied()
                    .unwrap_or(SignedAmount::ZERO);
                LabelBalance {
                    label,
                    confirmed,
                    pending: total - confirmed,
                }
            })
            .collect()
    }

    /// Index of the first output of `txid` paying exactly `amount`.
    pub fn find_output(&self, txid: Txid, amount: Amount) -> Result<u32, NotFound> {
        self.ledger.find_output(txid, amount)
    }

    /// Make a prevout known to the wallet without its transaction.
    pub fn insert_txout(&mut self, outpoint: OutPoint, txout: TxOut) -> bool {
        self.ledger.insert_txout(outpoint, txout)
    }

    /// Ingest a transaction relayed from the network.
    ///
    /// Returns `None` if the transaction neither pays to nor spends from the wallet.
    pub fn apply_unconfirmed_tx<T>(&mut self, tx: T) -> Result<Option<Accepted>, InvalidInput>
    where
        T: Into<Arc<Transaction>>,
    {
        let tx: Arc<Transaction> = tx.into();
        if !self.ledger.is_relevant(&tx) {
            return Ok(None);
        }
        self.ledger.accept(tx, TxOrigin::Observed).map(Some)
    }

    /// Apply a block connected at `height`.
    ///
    /// Relevant transactions of the block are recorded first. Their prevouts must be known to the
    /// wallet or created inside the block. Nothing is changed if the block does not extend the
    /// wallet's tip or a prevout is missing.
    pub fn apply_block(&mut self, block: &Block, height: u32) -> Result<EventOutcome, WalletError> {
        let block_id = BlockId {
            height,
            hash: block.block_hash(),
        };
        let tip = self.ledger.tip();
        if !self.ledger.chain().contains(block_id) && height != tip.height + 1 {
            return Err(InconsistentChainEvent::NotConnected {
                block: block_id,
                tip,
            }
            .into());
        }

        let relevant = self.relevant_block_txs(block)?;
        let block_txouts = block
            .txdata
            .iter()
            .flat_map(|tx| {
                let txid = tx.compute_txid();
                tx.output
                    .iter()
                    .enumerate()
                    .map(move |(vout, txout)| (OutPoint::new(txid, vout as u32), txout))
            })
            .collect::<HashMap<_, _>>();
        for tx in relevant {
            if !tx.is_coinbase() {
                for txin in &tx.input {
                    let prevout = txin.previous_output;
                    if self.ledger.store().get_txout(prevout).is_none() {
                        if let Some(txout) = block_txouts.get(&prevout) {
                            self.ledger.insert_txout(prevout, (*txout).clone());
                        }
                    }
                }
            }
            self.ledger.accept(tx.clone(), TxOrigin::Observed)?;
        }

        let event =
            ChainEvent::connected(block_id, block.txdata.iter().map(|tx| tx.compute_txid()));
        Ok(self.ledger.on_chain_event(&event)?)
    }

    /// The transactions of `block` the wallet records, in block order.
    fn relevant_block_txs<'b>(
        &self,
        block: &'b Block,
    ) -> Result<Vec<&'b Transaction>, InvalidInput> {
        let index = self.ledger.label_index();
        let store = self.ledger.store();
        let mut created = HashSet::new();
        let mut owned = HashSet::new();
        let mut relevant = Vec::new();
        for tx in &block.txdata {
            let txid = tx.compute_txid();
            let spends_owned = !tx.is_coinbase()
                && tx.input.iter().any(|txin| {
                    owned.contains(&txin.previous_output)
                        || store
                            .get_txout(txin.previous_output)
                            .map_or(false, |txout| index.is_mine(&txout.script_pubkey))
                });
            let outpoints = (0..tx.output.len() as u32).map(|vout| OutPoint::new(txid, vout));
            if spends_owned || index.pays_to_owned(tx) {
                if !tx.is_coinbase() {
                    for (vin, txin) in tx.input.iter().enumerate() {
                        let prevout = txin.previous_output;
                        if store.get_txout(prevout).is_none() && !created.contains(&prevout) {
                            return Err(InvalidInput {
                                txid,
                                vin,
                                outpoint: prevout,
                            });
                        }
                    }
                }
                owned.extend(
                    outpoints
                        .clone()
                        .zip(&tx.output)
                        .filter(|(_, txout)| index.is_mine(&txout.script_pubkey))
                        .map(|(op, _)| op),
                );
                relevant.push(tx);
            }
            created.extend(outpoints);
        }
        Ok(relevant)
    }

    /// Disconnect the wallet's tip.
    pub fn disconnect_block(&mut self, block_id: BlockId) -> Result<EventOutcome, WalletError> {
        let event = ChainEvent::disconnected(block_id, []);
        Ok(self.ledger.on_chain_event(&event)?)
    }

    /// Evict conflicts no accepted reorg can revive. See [`LedgerEngine::prune_final_conflicts`].
    pub fn prune_final_conflicts(&mut self) -> BTreeSet<Txid> {
        self.ledger.prune_final_conflicts()
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wallet at {} with {} transactions and {} labels",
            self.tip(),
            self.ledger.store().len(),
            self.ledger.labels().len()
        )
    }
}

fn unsigned_txin(previous_output: OutPoint) -> TxIn {
    TxIn {
        previous_output,
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        ..Default::default()
    }
}
