use bitcoin::{
    absolute, block, hashes::Hash, transaction, Amount, Block, BlockHash, CompactTarget, OutPoint,
    ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode, TxOut, WPubkeyHash, Witness,
};
use tally_core::BlockId;

/// Block subsidy of every mined block.
pub const SUBSIDY: Amount = Amount::from_sat(10 * 100_000_000);

/// Timestamp of the genesis block.
pub const GENESIS_TIME: u32 = 1_296_688_602;

/// Parse a decimal amount of coins, panicking on invalid input.
#[allow(unused_macros)]
#[macro_export]
macro_rules! btc {
    ($amount:literal) => {{
        $crate::bitcoin::Amount::from_str_in(
            stringify!($amount),
            $crate::bitcoin::Denomination::Bitcoin,
        )
        .expect("valid amount")
    }};
}

/// A script no wallet of the network owns.
pub fn foreign_spk(tag: &str) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(tag.as_bytes()))
}

/// A coinbase paying `value` to `script_pubkey` at `height`.
pub fn coinbase_tx(height: u32, script_pubkey: ScriptBuf, value: Amount) -> Transaction {
    Transaction {
        version: transaction::Version::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::builder()
                .push_int(height as _)
                // random number so that re-mining creates a unique coinbase
                .push_int(rand::random::<u32>() as _)
                .into_script(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey,
        }],
    }
}

/// A block at `height` on top of `prev_blockhash`.
pub fn new_block(prev_blockhash: BlockHash, height: u32, txdata: Vec<Transaction>) -> Block {
    let mut block = Block {
        header: block::Header {
            version: block::Version::TWO,
            prev_blockhash,
            merkle_root: TxMerkleNode::all_zeros(),
            time: GENESIS_TIME + height * 600,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: 0,
        },
        txdata,
    };
    if let Some(merkle_root) = block.compute_merkle_root() {
        block.header.merkle_root = merkle_root;
    }
    block
}

/// The genesis block every node starts from.
pub fn genesis_block() -> Block {
    new_block(BlockHash::all_zeros(), 0, Vec::new())
}

/// The [`BlockId`] of `block` at `height`.
pub fn block_id(block: &Block, height: u32) -> BlockId {
    BlockId {
        height,
        hash: block.block_hash(),
    }
}
