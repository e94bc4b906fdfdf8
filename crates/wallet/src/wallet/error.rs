//! Errors that can be returned by the [`Wallet`](crate::wallet::Wallet)

use crate::wallet::coin_selection::InsufficientFunds;
use bitcoin::{Amount, SignedAmount};
use core::fmt;
use tally_chain::{InconsistentChainEvent, InvalidInput, LedgerError, NotFound};
use tally_core::Label;

#[derive(Debug)]
/// Error returned from [`Wallet::send_from`]
///
/// [`Wallet::send_from`]: crate::wallet::Wallet::send_from
pub enum CreateTxError {
    /// The label to send from is not known to the wallet
    UnknownLabel(Label),
    /// Requested to send a zero amount
    ZeroAmount,
    /// The balance of the label does not cover the amount
    BalanceTooLow {
        /// Label the payment is charged to
        label: Label,
        /// Requested amount
        needed: Amount,
        /// Balance of the label
        available: SignedAmount,
    },
    /// The spendable outputs do not cover the amount plus fees
    CoinSelection(InsufficientFunds),
    /// The ledger refused the created transaction
    Rejected(InvalidInput),
}

impl fmt::Display for CreateTxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLabel(label) => write!(f, "Unknown label `{}`", label),
            Self::ZeroAmount => write!(f, "Cannot send a zero amount"),
            Self::BalanceTooLow {
                label,
                needed,
                available,
            } => write!(
                f,
                "Balance of `{}` too low: {} available of {} needed",
                label, available, needed
            ),
            Self::CoinSelection(err) => err.fmt(f),
            Self::Rejected(err) => write!(f, "Created transaction was rejected: {}", err),
        }
    }
}

impl From<InsufficientFunds> for CreateTxError {
    fn from(err: InsufficientFunds) -> Self {
        CreateTxError::CoinSelection(err)
    }
}

impl From<InvalidInput> for CreateTxError {
    fn from(err: InvalidInput) -> Self {
        CreateTxError::Rejected(err)
    }
}

impl std::error::Error for CreateTxError {}

/// Errors returned when ingesting data into or querying a [`Wallet`].
///
/// [`Wallet`]: crate::wallet::Wallet
#[derive(Debug)]
pub enum WalletError {
    /// Error from the underlying ledger
    Ledger(LedgerError),
    /// The wallet could not be encoded or decoded
    Persist(serde_json::Error),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger(err) => err.fmt(f),
            Self::Persist(err) => write!(f, "Failed to persist wallet: {}", err),
        }
    }
}

impl std::error::Error for WalletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::Persist(err) => Some(err),
        }
    }
}

impl From<LedgerError> for WalletError {
    fn from(err: LedgerError) -> Self {
        WalletError::Ledger(err)
    }
}

impl From<NotFound> for WalletError {
    fn from(err: NotFound) -> Self {
        WalletError::Ledger(err.into())
    }
}

impl From<InvalidInput> for WalletError {
    fn from(err: InvalidInput) -> Self {
        WalletError::Ledger(err.into())
    }
}

impl From<InconsistentChainEvent> for WalletError {
    fn from(err: InconsistentChainEvent) -> Self {
        WalletError::Ledger(err.into())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Persist(err)
    }
}
