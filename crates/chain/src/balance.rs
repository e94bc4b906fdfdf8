//! Per-label balances computed from the records of a [`TxStore`].
//!
//! Nothing is cached: every query walks the current records, so a balance can never drift from
//! the states it is derived from.
use crate::collections::BTreeMap;
use crate::{ChainView, LabelIndex, NotFound, TxRecord, TxStore};
use bitcoin::{Amount, SignedAmount};
use tally_core::{to_signed, KeychainKind, Label, LabelFilter, TxState};

/// The signed confirmation count of a record in `state`.
///
/// Confirmed records count blocks from their inclusion to the tip, pending records have zero and
/// conflicted records mirror the negated count of their winner.
pub fn signed_confirmations<C: ChainView>(store: &TxStore, chain: &C, state: TxState) -> i64 {
    match state {
        TxState::Pending => 0,
        TxState::Confirmed(block) => chain.confirmations_at(block.height) as i64,
        TxState::Conflicted(winner) => match store.get(winner).map(|record| record.state()) {
            Some(TxState::Confirmed(block)) => -(chain.confirmations_at(block.height) as i64),
            _ => 0,
        },
    }
}

fn saturating_add(sum: Amount, value: Amount) -> Amount {
    sum.checked_add(value).unwrap_or(Amount::MAX)
}

/// Sums record effects per label.
///
/// For each record that counts:
///
/// * every owned receive output credits the label of its script;
/// * owned inputs minus owned change outputs are debited once from the record's debit label,
///   which already contains the fee.
///
/// A coinbase credit only counts once it is mature.
#[derive(Debug, Clone, Copy)]
pub struct LabelBalanceAggregator<'a, C> {
    store: &'a TxStore,
    chain: &'a C,
    index: &'a LabelIndex,
    coinbase_maturity: u32,
}

impl<'a, C: ChainView> LabelBalanceAggregator<'a, C> {
    /// Construct an aggregator.
    pub fn new(
        store: &'a TxStore,
        chain: &'a C,
        index: &'a LabelIndex,
        coinbase_maturity: u32,
    ) -> Self {
        Self {
            store,
            chain,
            index,
            coinbase_maturity,
        }
    }

    /// Sum of owned outputs spent by `record`.
    pub fn debit(&self, record: &TxRecord) -> Amount {
        record
            .spent_outpoints()
            .filter_map(|op| self.store.get_txout(op))
            .filter(|txout| self.index.is_mine(&txout.script_pubkey))
            .map(|txout| txout.value)
            .fold(Amount::ZERO, saturating_add)
    }

    /// Sum of owned outputs created by `record`.
    pub fn credit(&self, record: &TxRecord) -> Amount {
        record
            .outputs()
            .filter(|(_, txout)| self.index.is_mine(&txout.script_pubkey))
            .map(|(_, txout)| txout.value)
            .fold(Amount::ZERO, saturating_add)
    }

    /// Effect of `record` on each label, regardless of its state.
    pub fn deltas(&self, record: &TxRecord) -> BTreeMap<Label, SignedAmount> {
        let mut deltas = BTreeMap::<Label, SignedAmount>::new();
        let debit = self.debit(record);
        let immature = record.is_coinbase() && !self.is_mature(record);

        let mut change = Amount::ZERO;
        for (_, txout) in record.outputs() {
            let owner = match self.index.owner(&txout.script_pubkey) {
                Some(owner) => owner,
                None => continue,
            };
            if owner.keychain == KeychainKind::Internal && debit > Amount::ZERO {
                change += txout.value;
            } else if !immature {
                *deltas.entry(owner.label.clone()).or_insert(SignedAmount::ZERO) +=
                    to_signed(txout.value);
            }
        }
        if debit > Amount::ZERO {
            *deltas
                .entry(record.origin().debit_label())
                .or_insert(SignedAmount::ZERO) -= to_signed(debit) - to_signed(change);
        }
        deltas
    }

    fn is_mature(&self, record: &TxRecord) -> bool {
        let confirmations = signed_confirmations(self.store, self.chain, record.state());
        confirmations > self.coinbase_maturity as i64
    }

    /// Whether `record` is counted at `min_conf`.
    pub fn counts(&self, record: &TxRecord, min_conf: u32) -> bool {
        !record.state().is_conflicted()
            && signed_confirmations(self.store, self.chain, record.state()) >= min_conf as i64
    }

    /// Balance of every known label. Labels without any counted effect are zero.
    pub fn by_label(&self, min_conf: u32) -> BTreeMap<Label, SignedAmount> {
        let mut balances = self
            .index
            .labels()
            .map(|label| (label.clone(), SignedAmount::ZERO))
            .collect::<BTreeMap<_, _>>();
        for record in self.store.iter() {
            if !self.counts(record, min_conf) {
                continue;
            }
            for (label, delta) in self.deltas(record) {
                *balances.entry(label).or_insert(SignedAmount::ZERO) += delta;
            }
        }
        balances
    }

    /// Balance of the labels matched by `filter`.
    ///
    /// Returns [`NotFound::Label`] for a label that was never assigned.
    pub fn balance(&self, filter: &LabelFilter, min_conf: u32) -> Result<SignedAmount, NotFound> {
        if let LabelFilter::Only(label) = filter {
            if !self.index.contains_label(label) {
                return Err(NotFound::Label(label.clone()));
            }
        }
        Ok(self
            .store
            .iter()
            .filter(|record| self.counts(record, min_conf))
            .flat_map(|record| self.deltas(record))
            .filter(|(label, _)| filter.matches(label))
            .map(|(_, delta)| delta)
            .fold(SignedAmount::ZERO, |acc, delta| acc + delta))
    }
}
