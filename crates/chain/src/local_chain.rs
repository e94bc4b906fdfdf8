//! The [`LocalChain`] is a local record of the best chain built from [`ChainEvent`]s.
use crate::collections::*;
use crate::{ChainView, InconsistentChainEvent};
use bitcoin::{BlockHash, Txid};
use tally_core::{BlockId, ChainEvent};

/// A block of the [`LocalChain`] and the txids it includes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
struct ChainBlock {
    hash: BlockHash,
    txids: Vec<Txid>,
}

/// A change the [`LocalChain`] went through after applying a [`ChainEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainChange {
    /// The block became the new tip.
    Connected {
        /// The new tip.
        block: BlockId,
        /// Txids included in the block.
        txids: Vec<Txid>,
    },
    /// The block was removed from the tip.
    Disconnected {
        /// The removed block.
        block: BlockId,
        /// Txids the block included.
        txids: Vec<Txid>,
    },
}

impl ChainChange {
    /// The block that changed.
    pub fn block(&self) -> BlockId {
        match self {
            ChainChange::Connected { block, .. } | ChainChange::Disconnected { block, .. } => {
                *block
            }
        }
    }

    /// Txids of the block that changed.
    pub fn txids(&self) -> &[Txid] {
        match self {
            ChainChange::Connected { txids, .. } | ChainChange::Disconnected { txids, .. } => txids,
        }
    }
}

/// The best chain as learned from a sequence of connect and disconnect events.
///
/// The chain starts at a genesis block and only grows or shrinks at its tip. Replaying an event
/// that was already applied is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LocalChain {
    genesis: BlockId,
    blocks: BTreeMap<u32, ChainBlock>,
    inclusions: HashMap<Txid, u32>,
    disconnected: HashSet<BlockHash>,
    /// Highest tip height reached so far.
    highest: u32,
}

impl LocalChain {
    /// Construct a chain holding only `genesis`.
    pub fn from_genesis(genesis: BlockId) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            genesis.height,
            ChainBlock {
                hash: genesis.hash,
                txids: Vec::new(),
            },
        );
        Self {
            genesis,
            blocks,
            inclusions: HashMap::new(),
            disconnected: HashSet::new(),
            highest: genesis.height,
        }
    }

    /// The genesis block.
    pub fn genesis(&self) -> BlockId {
        self.genesis
    }

    /// The block at `height` in the best chain.
    pub fn get(&self, height: u32) -> Option<BlockId> {
        self.blocks.get(&height).map(|block| BlockId {
            height,
            hash: block.hash,
        })
    }

    /// Whether `block` is part of the best chain.
    pub fn contains(&self, block: BlockId) -> bool {
        self.get(block.height) == Some(block)
    }

    /// Txids included by the block at `height`.
    pub fn block_txids(&self, height: u32) -> Option<&[Txid]> {
        self.blocks.get(&height).map(|block| block.txids.as_slice())
    }

    /// Iterate over blocks of the best chain from genesis to tip.
    pub fn iter_blocks(&self) -> impl DoubleEndedIterator<Item = BlockId> + '_ {
        self.blocks.iter().map(|(&height, block)| BlockId {
            height,
            hash: block.hash,
        })
    }

    /// Apply `event` to the chain.
    ///
    /// Returns `Ok(None)` when the event was already applied. A connected block must extend the
    /// tip and only the tip can be disconnected. Disconnecting is refused when it would roll back
    /// more than `max_reorg_depth` blocks from the highest tip seen.
    pub fn apply_event(
        &mut self,
        event: &ChainEvent,
        max_reorg_depth: u32,
    ) -> Result<Option<ChainChange>, InconsistentChainEvent> {
        match event {
            ChainEvent::Connected { block, txids } => self.connect(*block, txids),
            ChainEvent::Disconnected { block, .. } => self.disconnect(*block, max_reorg_depth),
        }
    }

    fn connect(
        &mut self,
        block: BlockId,
        txids: &[Txid],
    ) -> Result<Option<ChainChange>, InconsistentChainEvent> {
        if self.contains(block) {
            return Ok(None);
        }
        let tip = self.tip();
        if block.height != tip.height + 1 {
            return Err(InconsistentChainEvent::NotConnected { block, tip });
        }
        for &txid in txids {
            self.inclusions.entry(txid).or_insert(block.height);
        }
        self.blocks.insert(
            block.height,
            ChainBlock {
                hash: block.hash,
                txids: txids.to_vec(),
            },
        );
        self.disconnected.remove(&block.hash);
        self.highest = self.highest.max(block.height);
        Ok(Some(ChainChange::Connected {
            block,
            txids: txids.to_vec(),
        }))
    }

    fn disconnect(
        &mut self,
        block: BlockId,
        max_reorg_depth: u32,
    ) -> Result<Option<ChainChange>, InconsistentChainEvent> {
        if block == self.genesis {
            return Err(InconsistentChainEvent::Genesis(block));
        }
        let tip = self.tip();
        if block != tip {
            if self.contains(block) {
                return Err(InconsistentChainEvent::NotTip { block, tip });
            }
            if self.disconnected.contains(&block.hash) {
                return Ok(None);
            }
            return Err(InconsistentChainEvent::UnknownBlock(block));
        }

        let depth = self.highest + 1 - block.height;
        if depth > max_reorg_depth {
            return Err(InconsistentChainEvent::ReorgTooDeep {
                block,
                depth,
                max_reorg_depth,
            });
        }

        let removed = match self.blocks.remove(&block.height) {
            Some(removed) => removed,
            None => return Err(InconsistentChainEvent::UnknownBlock(block)),
        };
        for txid in &removed.txids {
            if self.inclusions.get(txid) == Some(&block.height) {
                self.inclusions.remove(txid);
            }
        }
        self.disconnected.insert(block.hash);
        Ok(Some(ChainChange::Disconnected {
            block,
            txids: removed.txids,
        }))
    }
}

impl ChainView for LocalChain {
    fn tip(&self) -> BlockId {
        self.blocks
            .iter()
            .next_back()
            .map(|(&height, block)| BlockId {
                height,
                hash: block.hash,
            })
            .unwrap_or(self.genesis)
    }

    fn inclusion(&self, txid: Txid) -> Option<BlockId> {
        let height = *self.inclusions.get(&txid)?;
        self.get(height)
    }
}
