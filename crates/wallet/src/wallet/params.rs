use bitcoin::FeeRate;
use tally_chain::LedgerParams;
use tally_core::BlockId;

/// Fee rate used when none is set: 10 sat/vB.
pub const DEFAULT_FEE_RATE: FeeRate = FeeRate::from_sat_per_kwu(2500);

/// Parameters for [`Wallet::create`].
///
/// [`Wallet::create`]: crate::Wallet::create
#[must_use]
#[derive(Debug, Clone)]
pub struct WalletParams {
    pub(crate) seed: Option<[u8; 32]>,
    pub(crate) ledger: LedgerParams,
    pub(crate) fee_rate: FeeRate,
}

impl WalletParams {
    /// Construct parameters for a wallet tracking the chain starting at `genesis`.
    ///
    /// Default values: a random `seed`, [`DEFAULT_FEE_RATE`] and the ledger defaults of
    /// [`LedgerParams::new`].
    pub fn new(genesis: BlockId) -> Self {
        Self {
            seed: None,
            ledger: LedgerParams::new(genesis),
            fee_rate: DEFAULT_FEE_RATE,
        }
    }

    /// Derive scripts from `seed` instead of a random one.
    pub fn seed(mut self, seed: [u8; 32]) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use `fee_rate` for created transactions.
    pub fn fee_rate(mut self, fee_rate: FeeRate) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Set the coinbase maturity of the ledger.
    pub fn coinbase_maturity(mut self, coinbase_maturity: u32) -> Self {
        self.ledger = self.ledger.coinbase_maturity(coinbase_maturity);
        self
    }

    /// Set the maximum reorg depth of the ledger.
    pub fn max_reorg_depth(mut self, max_reorg_depth: u32) -> Self {
        self.ledger = self.ledger.max_reorg_depth(max_reorg_depth);
        self
    }
}
