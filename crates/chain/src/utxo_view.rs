//! Unspent outputs as seen from the ledger's current state.
use crate::{ChainView, LabelIndex, TxRecord, TxStore};
use bitcoin::{OutPoint, TxOut};
use tally_core::{KeychainKind, Label, TxState};

/// Which records a [`UtxoView`] treats as existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UtxoMode {
    /// Only records confirmed in the best chain.
    ConfirmedOnly,
    /// Confirmed and pending records.
    #[default]
    IncludeUnconfirmed,
}

/// An owned unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUtxo {
    /// Where the output is.
    pub outpoint: OutPoint,
    /// The output itself.
    pub txout: TxOut,
    /// Label of the output's script.
    pub label: Label,
    /// Keychain of the output's script.
    pub keychain: KeychainKind,
    /// State of the creating record. `None` for floating txouts.
    pub state: Option<TxState>,
    /// Confirmations of the creating record. Zero while pending.
    pub confirmations: u32,
    /// Whether the output was created by a coinbase.
    pub is_coinbase: bool,
}

/// The set of unspent outputs derived from a [`TxStore`].
///
/// A conflicted record never creates or spends anything.
#[derive(Debug, Clone, Copy)]
pub struct UtxoView<'a, C> {
    store: &'a TxStore,
    chain: &'a C,
    index: &'a LabelIndex,
    mode: UtxoMode,
}

impl<'a, C: ChainView> UtxoView<'a, C> {
    /// Construct a view.
    pub fn new(store: &'a TxStore, chain: &'a C, index: &'a LabelIndex, mode: UtxoMode) -> Self {
        Self {
            store,
            chain,
            index,
            mode,
        }
    }

    fn counts(&self, record: &TxRecord) -> bool {
        match record.state() {
            TxState::Confirmed(_) => true,
            TxState::Pending => self.mode == UtxoMode::IncludeUnconfirmed,
            TxState::Conflicted(_) => false,
        }
    }

    /// Whether the output at `outpoint` exists and no counted record spends it.
    ///
    /// Floating txouts are assumed to exist.
    pub fn is_unspent(&self, outpoint: OutPoint) -> bool {
        let exists = match self.store.get(outpoint.txid) {
            Some(record) => {
                self.counts(record) && (outpoint.vout as usize) < record.tx().output.len()
            }
            None => self.store.get_txout(outpoint).is_some(),
        };
        exists && !self.is_spent(outpoint)
    }

    /// Whether a counted record spends `outpoint`.
    pub fn is_spent(&self, outpoint: OutPoint) -> bool {
        self.store
            .outspends(outpoint)
            .iter()
            .filter_map(|txid| self.store.get(*txid))
            .any(|spender| self.counts(spender))
    }

    /// The label owning the output at `outpoint`, if it is owned.
    pub fn owner_label(&self, outpoint: OutPoint) -> Option<&'a Label> {
        let txout = self.store.get_txout(outpoint)?;
        self.index.label_of(&txout.script_pubkey)
    }

    /// The owned unspent output at `outpoint`.
    pub fn get(&self, outpoint: OutPoint) -> Option<LocalUtxo> {
        if !self.is_unspent(outpoint) {
            return None;
        }
        let txout = self.store.get_txout(outpoint)?;
        let owner = self.index.owner(&txout.script_pubkey)?;
        let record = self.store.get(outpoint.txid);
        let confirmations = record
            .and_then(|record| record.state().confirmation_block())
            .map(|block| self.chain.confirmations_at(block.height))
            .unwrap_or(0);
        Some(LocalUtxo {
            outpoint,
            txout: txout.clone(),
            label: owner.label.clone(),
            keychain: owner.keychain,
            state: record.map(|record| record.state()),
            confirmations,
            is_coinbase: record.map_or(false, |record| record.is_coinbase()),
        })
    }

    /// Every owned unspent output, ordered by outpoint.
    pub fn owned_unspent(&self) -> Vec<LocalUtxo> {
        let recorded = self
            .store
            .iter()
            .flat_map(|record| record.outputs().map(|(op, _)| op));
        let floating = self.store.floating_txouts().map(|(op, _)| op);
        let mut utxos = recorded
            .chain(floating)
            .filter_map(|op| self.get(op))
            .collect::<Vec<_>>();
        utxos.sort_by_key(|utxo| utxo.outpoint);
        utxos
    }
}
