//! A label-aware wallet built on the [`tally_chain`] ledger.
//!
//! The [`Wallet`] hands out scripts grouped under labels, pays from a label with
//! [`Wallet::send_from`], and ingests blocks and relayed transactions. Double-spends between its
//! own transactions and transactions it learns about from the network are resolved by the ledger:
//! a losing transaction reports negative confirmations mirroring the winner and stops counting
//! towards any balance.
//!
//! ```
//! # use tally_wallet::{Wallet, WalletParams};
//! # use tally_core::BlockId;
//! let mut wallet = Wallet::create(WalletParams::new(BlockId::default()).seed([7; 32]));
//! let foo = wallet.new_address("foo");
//! assert_eq!(wallet.label_of(&foo.script_pubkey).map(|l| l.as_str()), Some("foo"));
//! ```

#![warn(missing_docs)]

pub extern crate bitcoin;
pub extern crate serde_json;
pub extern crate tally_chain as chain;
pub extern crate tally_core;

mod types;
mod wallet;

pub(crate) use tally_core::collections;
pub use types::*;
pub use wallet::*;

/// Get the version of [`tally_wallet`](crate) at runtime.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION", "unknown")
}
