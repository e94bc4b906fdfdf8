use core::fmt;
use std::sync::Arc;

use bitcoin::{ScriptBuf, SignedAmount, Transaction, Txid};
use tally_core::{BlockId, KeychainKind, Label};

/// A derived script and the index it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// Child index of this script
    pub index: u32,
    /// The script pubkey
    pub script_pubkey: ScriptBuf,
    /// Type of keychain
    pub keychain: KeychainKind,
    /// Label the script was handed out under
    pub label: Label,
}

impl fmt::Display for AddressInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.script_pubkey)
    }
}

/// Whether a [`TxDetail`] moves value out of or into the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Value paid out by the wallet
    Send,
    /// Value received by one of the wallet's labels
    Receive,
}

/// One line of a [`WalletTx`] breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDetail {
    /// The label the line is accounted to
    pub label: Label,
    /// Send or receive
    pub category: Category,
    /// Negative for sends
    pub amount: SignedAmount,
    /// Index of the output
    pub vout: u32,
    /// Negative fee, only set on sends
    pub fee: Option<SignedAmount>,
}

/// A wallet transaction as reported by [`Wallet::get_transaction`].
///
/// [`Wallet::get_transaction`]: crate::Wallet::get_transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTx {
    /// Transaction id
    pub txid: Txid,
    /// Net effect on the wallet, excluding the fee for transactions paid by the wallet
    pub amount: SignedAmount,
    /// Negative fee paid by the wallet. `None` if the wallet did not pay for it.
    pub fee: Option<SignedAmount>,
    /// Signed confirmation count. Negative while conflicted by a confirmed transaction.
    pub confirmations: i64,
    /// Block confirming the transaction in the best chain
    pub block: Option<BlockId>,
    /// Transactions spending an input in common with this one
    pub conflicts: Vec<Txid>,
    /// The transaction
    pub tx: Arc<Transaction>,
    /// Per output breakdown
    pub details: Vec<TxDetail>,
}

/// A transaction with the signing result of [`Wallet::sign_raw_transaction`].
///
/// [`Wallet::sign_raw_transaction`]: crate::Wallet::sign_raw_transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    /// The transaction
    pub tx: Transaction,
    /// Whether every input spends an output the wallet can sign for
    pub complete: bool,
}

/// Totals of a balance query per label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelBalance {
    /// The label
    pub label: Label,
    /// Balance with at least one confirmation
    pub confirmed: SignedAmount,
    /// Balance of pending transactions
    pub pending: SignedAmount,
}

impl LabelBalance {
    /// Confirmed plus pending.
    pub fn total(&self) -> SignedAmount {
        self.confirmed + self.pending
    }
}
