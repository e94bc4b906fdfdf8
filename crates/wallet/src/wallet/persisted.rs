use bitcoin::FeeRate;
use serde::{Deserialize, Serialize};
use tally_chain::{LedgerEngine, Snapshot};
use tally_core::KeychainKind;

use crate::collections::BTreeMap;
use crate::wallet::{Wallet, WalletError};

/// The durable form of a [`Wallet`].
///
/// Only what cannot be derived again is stored: the seed, the derivation progress and a
/// [`Snapshot`] of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletFile {
    /// Seed scripts are derived from
    pub seed: [u8; 32],
    /// Next external derivation index
    pub external_index: u32,
    /// Next internal derivation index
    pub internal_index: u32,
    /// Fee rate in sat/kwu
    pub fee_rate: u64,
    /// The ledger
    pub ledger: Snapshot,
}

impl Wallet {
    /// Take the durable form of the wallet.
    pub fn to_file(&self) -> WalletFile {
        WalletFile {
            seed: *self.seed(),
            external_index: self.next_derivation_index(KeychainKind::External),
            internal_index: self.next_derivation_index(KeychainKind::Internal),
            fee_rate: self.fee_rate().to_sat_per_kwu(),
            ledger: self.ledger().snapshot(),
        }
    }

    /// Restore a wallet from its durable form. Transaction states are derived again.
    pub fn from_file(file: WalletFile) -> Self {
        let next_index = BTreeMap::from([
            (KeychainKind::External, file.external_index),
            (KeychainKind::Internal, file.internal_index),
        ]);
        Wallet::from_parts(
            LedgerEngine::from_snapshot(file.ledger),
            file.seed,
            next_index,
            FeeRate::from_sat_per_kwu(file.fee_rate),
        )
    }

    /// Encode the wallet as JSON.
    pub fn to_json(&self) -> Result<String, WalletError> {
        Ok(serde_json::to_string(&self.to_file())?)
    }

    /// Decode a wallet encoded with [`Wallet::to_json`].
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let file = serde_json::from_str::<WalletFile>(json)?;
        Ok(Self::from_file(file))
    }
}
