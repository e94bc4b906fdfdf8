//! This crate is a collection of core structures for the tally wallet ledger.
//!
//! These types are shared by the ledger engine ([`tally_chain`]) and the wallet facade
//! ([`tally_wallet`]). They describe *where* a transaction sits relative to the best chain
//! ([`TxState`]), *who* created it ([`TxOrigin`]), *how* owned scripts are grouped ([`Label`]) and
//! the chain events that move transactions between states ([`ChainEvent`]).
//!
//! [`tally_chain`]: https://docs.rs/tally_chain
//! [`tally_wallet`]: https://docs.rs/tally_wallet

#![warn(missing_docs)]

pub use bitcoin;

#[cfg(feature = "serde")]
pub extern crate serde;

#[doc(hidden)]
pub mod collections {
    pub use std::collections::{hash_map, *};
}

mod block_id;
pub use block_id::*;

mod chain_event;
pub use chain_event::*;

mod label;
pub use label::*;

mod tx_state;
pub use tx_state::*;

use bitcoin::{Amount, SignedAmount};

/// Converts an unsigned [`Amount`] into a [`SignedAmount`], saturating at [`SignedAmount::MAX`].
pub fn to_signed(amount: Amount) -> SignedAmount {
    i64::try_from(amount.to_sat())
        .map(SignedAmount::from_sat)
        .unwrap_or(SignedAmount::MAX)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn to_signed_saturates() {
        assert_eq!(to_signed(Amount::from_sat(42)), SignedAmount::from_sat(42));
        assert_eq!(to_signed(Amount::MAX), SignedAmount::MAX);
    }
}
