use bitcoin::Txid;

use crate::{BlockId, Label};

/// The state of a transaction relative to the best chain.
///
/// The variants are mutually exclusive, so a transaction can never be confirmed and conflicted at
/// the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, core::hash::Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TxState {
    /// Not included in the best chain and not beaten by any conflicting transaction.
    Pending,
    /// Included in the best chain at the given block.
    Confirmed(BlockId),
    /// Superseded by the conflicting transaction `winner` (or by a transaction conflicting with
    /// one of its ancestors).
    Conflicted(Txid),
}

impl TxState {
    /// Whether the state is [`TxState::Pending`].
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the state is [`TxState::Confirmed`].
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Whether the state is [`TxState::Conflicted`].
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted(_))
    }

    /// The block the transaction is confirmed in, if any.
    pub fn confirmation_block(&self) -> Option<BlockId> {
        match self {
            Self::Confirmed(block) => Some(*block),
            _ => None,
        }
    }

    /// The transaction that superseded this one, if any.
    pub fn winner(&self) -> Option<Txid> {
        match self {
            Self::Conflicted(winner) => Some(*winner),
            _ => None,
        }
    }
}

impl core::fmt::Display for TxState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed(block) => write!(f, "confirmed at {}", block.height),
            Self::Conflicted(winner) => write!(f, "conflicted by {}", winner),
        }
    }
}

/// Where a transaction came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, core::hash::Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TxOrigin {
    /// Created by this node's wallet, spending on behalf of the `from` label.
    Wallet {
        /// The label the spend is charged to.
        from: Label,
    },
    /// Observed from the network or in a block.
    Observed,
}

impl TxOrigin {
    /// A wallet-created transaction charged to `from`.
    pub fn wallet(from: impl Into<Label>) -> Self {
        Self::Wallet { from: from.into() }
    }

    /// Whether this node's wallet created the transaction.
    pub fn is_wallet(&self) -> bool {
        matches!(self, Self::Wallet { .. })
    }

    /// The label that pays for what the transaction spends.
    ///
    /// Observed transactions are charged to the default label.
    pub fn debit_label(&self) -> Label {
        match self {
            Self::Wallet { from } => from.clone(),
            Self::Observed => Label::default(),
        }
    }
}
