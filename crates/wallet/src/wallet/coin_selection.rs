//! Coin selection
//!
//! The wallet spends the outputs of the label a payment is charged to before anything else, then
//! change, then the outputs of other labels. Within each group larger outputs go first.
//!
//! Labels only partition the wallet's balance, not its coins: a label with enough balance may
//! need outputs received under another label when its own outputs were spent by payments charged
//! elsewhere.

use core::cmp::Reverse;
use core::fmt::{self, Formatter};

use bitcoin::{Amount, FeeRate, Script};
use tally_chain::LocalUtxo;
use tally_core::{KeychainKind, Label};

/// Virtual size of a transaction without inputs and outputs.
pub const TX_OVERHEAD_VB: u64 = 11;
/// Virtual size of a signed P2WPKH input.
pub const P2WPKH_INPUT_VB: u64 = 68;
/// Virtual size of a P2WPKH output.
pub const P2WPKH_OUTPUT_VB: u64 = 31;

/// Wallet's UTXO set is not enough to cover recipient's requested plus fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientFunds {
    /// Amount needed for the transaction
    pub needed: Amount,
    /// Amount available for spending
    pub available: Amount,
}

impl fmt::Display for InsufficientFunds {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Insufficient funds: {} available of {} needed",
            self.available, self.needed
        )
    }
}

impl std::error::Error for InsufficientFunds {}

/// Remaining amount after performing coin selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Excess {
    /// The excess is too small to pay for a change output and is left to the fee
    NoChange {
        /// Threshold to consider amount as dust for the change script
        dust_threshold: Amount,
        /// Exceeding amount of the selection over outgoing value and fee costs
        remaining_amount: Amount,
    },
    /// The excess pays for a change output
    Change {
        /// Value of the change output
        amount: Amount,
        /// The fee paid for the change output
        fee: Amount,
    },
}

/// Result of a successful coin selection
#[derive(Debug, Clone)]
pub struct CoinSelectionResult {
    /// List of outputs selected for use as inputs
    pub selected: Vec<LocalUtxo>,
    /// Fee paid for the inputs, the recipient output and the change output if there is one
    pub fee_amount: Amount,
    /// Remaining amount after deducing fees and outgoing outputs
    pub excess: Excess,
}

impl CoinSelectionResult {
    /// The total value of the inputs selected.
    pub fn selected_amount(&self) -> Amount {
        self.selected.iter().map(|u| u.txout.value).sum()
    }

    /// The fee the transaction will actually pay. Excess that cannot be turned into change is
    /// included.
    pub fn absolute_fee(&self) -> Amount {
        match &self.excess {
            Excess::NoChange {
                remaining_amount, ..
            } => self.fee_amount + *remaining_amount,
            Excess::Change { .. } => self.fee_amount,
        }
    }
}

fn fee_for(fee_rate: FeeRate, vb: u64) -> Amount {
    fee_rate.fee_vb(vb).unwrap_or(Amount::MAX_MONEY)
}

/// Decide if change can be created
///
/// - `remaining_amount`: the amount in which the selected coins exceed the target amount
/// - `fee_rate`: required fee rate for the current selection
/// - `change_script`: script to consider change creation
pub fn decide_change(
    remaining_amount: Amount,
    fee_rate: FeeRate,
    change_script: &Script,
) -> Excess {
    let change_fee = fee_for(fee_rate, P2WPKH_OUTPUT_VB);
    let change_val = remaining_amount.checked_sub(change_fee).unwrap_or_default();
    let dust_threshold = change_script.minimal_non_dust();

    if change_val < dust_threshold {
        Excess::NoChange {
            dust_threshold,
            remaining_amount,
        }
    } else {
        Excess::Change {
            amount: change_val,
            fee: change_fee,
        }
    }
}

/// Lower is spent first.
fn spend_priority(utxo: &LocalUtxo, from: &Label) -> u8 {
    match utxo.keychain {
        KeychainKind::External if &utxo.label == from => 0,
        KeychainKind::Internal => 1,
        KeychainKind::External => 2,
    }
}

/// Selects from `candidates` until they pay `target_amount` to a single recipient plus fees at
/// `fee_rate`.
///
/// Every candidate must be spendable; this function only decides the order.
pub fn select_coins(
    mut candidates: Vec<LocalUtxo>,
    from: &Label,
    target_amount: Amount,
    fee_rate: FeeRate,
    change_script: &Script,
) -> Result<CoinSelectionResult, InsufficientFunds> {
    candidates.sort_by_key(|u| (spend_priority(u, from), Reverse(u.txout.value), u.outpoint));

    let base_vb = TX_OVERHEAD_VB + P2WPKH_OUTPUT_VB;
    let mut selected = Vec::new();
    let mut selected_amount = Amount::ZERO;
    let mut fee_amount = fee_for(fee_rate, base_vb);
    for utxo in candidates {
        if selected_amount >= target_amount + fee_amount {
            break;
        }
        selected_amount += utxo.txout.value;
        selected.push(utxo);
        fee_amount = fee_for(fee_rate, base_vb + P2WPKH_INPUT_VB * selected.len() as u64);
    }

    let amount_needed_with_fees = target_amount + fee_amount;
    if selected_amount < amount_needed_with_fees {
        return Err(InsufficientFunds {
            needed: amount_needed_with_fees,
            available: selected_amount,
        });
    }

    let remaining_amount = selected_amount - amount_needed_with_fees;
    let excess = decide_change(remaining_amount, fee_rate, change_script);
    if let Excess::Change { fee, .. } = &excess {
        fee_amount += *fee;
    }

    Ok(CoinSelectionResult {
        selected,
        fee_amount,
        excess,
    })
}
