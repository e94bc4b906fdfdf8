#![allow(unused)]

mod tx_template;
pub use tx_template::*;

use bitcoin::{hashes::Hash, ScriptBuf, WPubkeyHash};
use tally_chain::{LedgerEngine, LedgerParams};
use tally_core::{BlockId, KeychainKind, Label};

#[allow(unused_macros)]
macro_rules! h {
    ($index:expr) => {{
        bitcoin::hashes::Hash::hash($index.as_bytes())
    }};
}

#[allow(unused_macros)]
macro_rules! block_id {
    ($height:expr, $hash:literal) => {{
        tally_core::BlockId {
            height: $height,
            hash: bitcoin::hashes::Hash::hash($hash.as_bytes()),
        }
    }};
}

/// Labels of the scripts registered by [`new_ledger`], by script index.
pub const SPK_OWNERS: [(&str, KeychainKind); 10] = [
    ("", KeychainKind::External),
    ("", KeychainKind::External),
    ("", KeychainKind::External),
    ("foo", KeychainKind::External),
    ("foo", KeychainKind::External),
    ("foo", KeychainKind::External),
    ("bar", KeychainKind::External),
    ("bar", KeychainKind::External),
    ("bar", KeychainKind::External),
    ("", KeychainKind::Internal),
];

/// Script number `index`. Scripts `0..10` are owned by a ledger from [`new_ledger`].
pub fn spk_at(index: u32) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&index.to_le_bytes()))
}

/// A ledger with genesis `h!("0")` owning the scripts of [`SPK_OWNERS`].
pub fn new_ledger(params: impl FnOnce(LedgerParams) -> LedgerParams) -> LedgerEngine {
    let genesis = BlockId {
        height: 0,
        hash: h!("0"),
    };
    let mut engine = LedgerEngine::new(params(LedgerParams::new(genesis)));
    for (index, (label, keychain)) in SPK_OWNERS.iter().enumerate() {
        engine.insert_spk(spk_at(index as u32), Label::from(*label), *keychain);
    }
    engine
}

/// Block at `height` of the test chain.
pub fn chain_block(height: u32) -> BlockId {
    BlockId {
        height,
        hash: h!(height.to_string()),
    }
}
