//! Errors returned by the [`LedgerEngine`](crate::LedgerEngine).
use core::fmt;

use bitcoin::{Amount, OutPoint, Txid};
use tally_core::{BlockId, Label};

/// A transaction was rejected because one of its inputs references an output the ledger cannot
/// resolve.
///
/// Every non-coinbase input must spend either an output of a transaction already in the ledger or
/// a txout inserted with [`LedgerEngine::insert_txout`](crate::LedgerEngine::insert_txout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidInput {
    /// The transaction that was rejected.
    pub txid: Txid,
    /// Index of the offending input.
    pub vin: usize,
    /// The outpoint that could not be resolved.
    pub outpoint: OutPoint,
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input {} of transaction {} spends unknown output {}",
            self.vin, self.txid, self.outpoint
        )
    }
}

impl std::error::Error for InvalidInput {}

/// A query referenced something the ledger does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// No record exists for the txid.
    Tx(Txid),
    /// The label was never assigned to any script.
    Label(Label),
    /// The record exists but has no output paying the requested amount.
    Output {
        /// The record that was searched.
        txid: Txid,
        /// The amount that was looked for.
        amount: Amount,
    },
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::Tx(txid) => write!(f, "transaction {} not found", txid),
            NotFound::Label(label) => write!(f, "label {} not found", label),
            NotFound::Output { txid, amount } => {
                write!(f, "transaction {} has no output of {}", txid, amount)
            }
        }
    }
}

impl std::error::Error for NotFound {}

/// A chain event does not fit the chain the ledger currently tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistentChainEvent {
    /// A connected block does not extend the current tip.
    NotConnected {
        /// The block carried by the event.
        block: BlockId,
        /// The current tip.
        tip: BlockId,
    },
    /// Only the tip can be disconnected.
    NotTip {
        /// The block carried by the event.
        block: BlockId,
        /// The current tip.
        tip: BlockId,
    },
    /// The block was never connected.
    UnknownBlock(BlockId),
    /// The genesis block cannot be disconnected.
    Genesis(BlockId),
    /// Disconnecting the block would roll back more blocks than allowed.
    ReorgTooDeep {
        /// The block carried by the event.
        block: BlockId,
        /// Number of blocks the rollback would have removed.
        depth: u32,
        /// The configured limit.
        max_reorg_depth: u32,
    },
}

impl fmt::Display for InconsistentChainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InconsistentChainEvent::NotConnected { block, tip } => write!(
                f,
                "block {} does not connect to the current tip {}",
                block, tip
            ),
            InconsistentChainEvent::NotTip { block, tip } => write!(
                f,
                "cannot disconnect block {} as it is not the tip {}",
                block, tip
            ),
            InconsistentChainEvent::UnknownBlock(block) => {
                write!(f, "block {} was never connected", block)
            }
            InconsistentChainEvent::Genesis(block) => {
                write!(f, "cannot disconnect the genesis block {}", block)
            }
            InconsistentChainEvent::ReorgTooDeep {
                block,
                depth,
                max_reorg_depth,
            } => write!(
                f,
                "disconnecting block {} is a reorg of depth {}, the maximum is {}",
                block, depth, max_reorg_depth
            ),
        }
    }
}

impl std::error::Error for InconsistentChainEvent {}

/// Any error the ledger can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// See [`InvalidInput`].
    InvalidInput(InvalidInput),
    /// See [`NotFound`].
    NotFound(NotFound),
    /// See [`InconsistentChainEvent`].
    InconsistentChainEvent(InconsistentChainEvent),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InvalidInput(e) => write!(f, "invalid input: {}", e),
            LedgerError::NotFound(e) => write!(f, "not found: {}", e),
            LedgerError::InconsistentChainEvent(e) => {
                write!(f, "inconsistent chain event: {}", e)
            }
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::InvalidInput(e) => Some(e),
            LedgerError::NotFound(e) => Some(e),
            LedgerError::InconsistentChainEvent(e) => Some(e),
        }
    }
}

impl From<InvalidInput> for LedgerError {
    fn from(e: InvalidInput) -> Self {
        Self::InvalidInput(e)
    }
}

impl From<NotFound> for LedgerError {
    fn from(e: NotFound) -> Self {
        Self::NotFound(e)
    }
}

impl From<InconsistentChainEvent> for LedgerError {
    fn from(e: InconsistentChainEvent) -> Self {
        Self::InconsistentChainEvent(e)
    }
}
