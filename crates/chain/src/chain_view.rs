use bitcoin::Txid;
use tally_core::BlockId;

/// A view of the best chain.
///
/// The ledger only needs two facts from a chain: where its tip is and which block, if any,
/// includes a given transaction.
pub trait ChainView {
    /// The best chain's tip.
    fn tip(&self) -> BlockId;

    /// The block in the best chain that includes `txid`.
    fn inclusion(&self, txid: Txid) -> Option<BlockId>;

    /// Height of the tip.
    fn height(&self) -> u32 {
        self.tip().height
    }

    /// Height of the block in the best chain that includes `txid`.
    fn inclusion_height(&self, txid: Txid) -> Option<u32> {
        self.inclusion(txid).map(|block| block.height)
    }

    /// Confirmations a transaction included at `height` has. Zero if `height` is above the tip.
    fn confirmations_at(&self, height: u32) -> u32 {
        let tip = self.tip().height;
        if height > tip {
            0
        } else {
            tip - height + 1
        }
    }
}

impl<C: ChainView + ?Sized> ChainView for &C {
    fn tip(&self) -> BlockId {
        (**self).tip()
    }

    fn inclusion(&self, txid: Txid) -> Option<BlockId> {
        (**self).inclusion(txid)
    }
}
