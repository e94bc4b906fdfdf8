use tally_core::BlockId;

/// How many confirmations a coinbase output needs, beyond the first, before it can be spent.
pub const COINBASE_MATURITY: u32 = 100;

/// Default bound on how many blocks a single reorganization may roll back.
pub const DEFAULT_MAX_REORG_DEPTH: u32 = 10_000;

/// Parameters of a [`LedgerEngine`](crate::LedgerEngine).
///
/// ```
/// # use tally_chain::LedgerParams;
/// # use tally_core::BlockId;
/// let params = LedgerParams::new(BlockId::default())
///     .coinbase_maturity(10)
///     .max_reorg_depth(100);
/// assert_eq!(params.coinbase_maturity, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LedgerParams {
    /// The block the ledger's chain starts at.
    pub genesis: BlockId,
    /// A coinbase credit only counts once it has `coinbase_maturity + 1` confirmations.
    ///
    /// Defaults to [`COINBASE_MATURITY`].
    pub coinbase_maturity: u32,
    /// Disconnects rolling back more blocks than this are rejected, and conflicts whose winner is
    /// buried deeper are considered final.
    ///
    /// Defaults to [`DEFAULT_MAX_REORG_DEPTH`].
    pub max_reorg_depth: u32,
}

impl LedgerParams {
    /// Parameters with default values for a chain starting at `genesis`.
    pub fn new(genesis: BlockId) -> Self {
        Self {
            genesis,
            coinbase_maturity: COINBASE_MATURITY,
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
        }
    }

    /// Set the coinbase maturity.
    pub fn coinbase_maturity(mut self, coinbase_maturity: u32) -> Self {
        self.coinbase_maturity = coinbase_maturity;
        self
    }

    /// Set the maximum reorg depth.
    pub fn max_reorg_depth(mut self, max_reorg_depth: u32) -> Self {
        self.max_reorg_depth = max_reorg_depth;
        self
    }
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self::new(BlockId::default())
    }
}
