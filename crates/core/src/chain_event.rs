use bitcoin::Txid;

use crate::BlockId;

/// A block connection or disconnection delivered by the consensus layer.
///
/// The `txids` are the transactions contained in the block. Transactions the ledger does not know
/// about are remembered by the chain so that they are confirmed as soon as they are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ChainEvent {
    /// A block was connected on top of the best chain.
    Connected {
        /// The connected block.
        block: BlockId,
        /// Transactions contained in the block.
        txids: Vec<Txid>,
    },
    /// The tip of the best chain was disconnected.
    Disconnected {
        /// The disconnected block.
        block: BlockId,
        /// Transactions contained in the block.
        txids: Vec<Txid>,
    },
}

impl ChainEvent {
    /// Construct a [`ChainEvent::Connected`].
    pub fn connected(block: BlockId, txids: impl IntoIterator<Item = Txid>) -> Self {
        Self::Connected {
            block,
            txids: txids.into_iter().collect(),
        }
    }

    /// Construct a [`ChainEvent::Disconnected`].
    pub fn disconnected(block: BlockId, txids: impl IntoIterator<Item = Txid>) -> Self {
        Self::Disconnected {
            block,
            txids: txids.into_iter().collect(),
        }
    }

    /// The block this event refers to.
    pub fn block(&self) -> BlockId {
        match self {
            Self::Connected { block, .. } | Self::Disconnected { block, .. } => *block,
        }
    }

    /// The transactions contained in the block.
    pub fn txids(&self) -> &[Txid] {
        match self {
            Self::Connected { txids, .. } | Self::Disconnected { txids, .. } => txids,
        }
    }

    /// Whether this is a connection event.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}
