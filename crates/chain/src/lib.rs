//! The wallet transaction ledger.
//!
//! [`LedgerEngine`] ingests transactions (wallet sends and relayed transactions) and chain events
//! (block connects and disconnects). From those it derives, for every recorded transaction:
//!
//! 1. whether it is pending, confirmed in the best chain, or conflicted by a double-spend;
//! 2. a signed confirmation count, negative for conflicted transactions;
//! 3. its effect on the balance of each address label.
//!
//! States are always re-derived from the records and the best chain, so replaying the same
//! inputs always lands in the same state. Balances are computed on demand and never cached.
//!
//! ```
//! # use tally_chain::{LedgerEngine, LedgerParams};
//! # use tally_core::{BlockId, LabelFilter};
//! let engine = LedgerEngine::new(LedgerParams::new(BlockId::default()));
//! let balance = engine.balance(&LabelFilter::All, 0).unwrap();
//! assert_eq!(balance, bitcoin::SignedAmount::ZERO);
//! ```

#![warn(missing_docs)]

pub use bitcoin;
pub use tally_core;

pub(crate) use tally_core::collections;

mod balance;
pub use balance::*;
mod canonical;
mod chain_view;
pub use chain_view::*;
mod conflict;
pub use conflict::*;
mod engine;
pub use engine::*;
mod error;
pub use error::*;
mod label_index;
pub use label_index::*;
pub mod local_chain;
pub use local_chain::{ChainChange, LocalChain};
mod params;
pub use params::*;
mod shared;
pub use shared::*;
#[cfg(feature = "serde")]
mod snapshot;
#[cfg(feature = "serde")]
pub use snapshot::*;
pub mod tx_store;
pub use tx_store::{TxRecord, TxStore};
mod utxo_view;
pub use utxo_view::*;
