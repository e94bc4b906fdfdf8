#![allow(unused)]
use bitcoin::{
    absolute, block, hashes::Hash, transaction, Amount, Block, BlockHash, CompactTarget, OutPoint,
    ScriptBuf, Transaction, TxIn, TxMerkleNode, TxOut, Txid, WPubkeyHash,
};
use tally_core::BlockId;
use tally_wallet::{Wallet, WalletParams};

/// A block at `height` on top of `prev_blockhash`. Blocks that only differ in `nonce` compete for
/// the same height.
pub fn block(
    prev_blockhash: BlockHash,
    height: u32,
    nonce: u32,
    txdata: Vec<Transaction>,
) -> Block {
    Block {
        header: block::Header {
            version: block::Version::TWO,
            prev_blockhash,
            merkle_root: TxMerkleNode::all_zeros(),
            time: height,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce,
        },
        txdata,
    }
}

pub fn genesis_block() -> Block {
    block(BlockHash::all_zeros(), 0, 0, vec![])
}

pub fn block_id(block: &Block, height: u32) -> BlockId {
    BlockId {
        height,
        hash: block.block_hash(),
    }
}

/// An empty wallet with a fixed seed.
pub fn new_wallet() -> Wallet {
    Wallet::create(WalletParams::new(block_id(&genesis_block(), 0)).seed([1; 32]))
}

pub fn foreign_spk(tag: &str) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(tag.as_bytes()))
}

/// A payment of `value` to `to` from a foreign output. The wallet is told about the prevout.
pub fn payment(wallet: &mut Wallet, tag: &str, to: ScriptBuf, value: Amount) -> Transaction {
    let prevout = OutPoint::new(Txid::hash(tag.as_bytes()), 0);
    wallet.insert_txout(
        prevout,
        TxOut {
            value: value + Amount::from_sat(1_000),
            script_pubkey: foreign_spk(tag),
        },
    );
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: prevout,
            ..Default::default()
        }],
        output: vec![TxOut {
            value,
            script_pubkey: to,
        }],
    }
}

/// Return a wallet holding 1 BTC under `foo`, confirmed in block 1.
///
/// Returns the wallet, block 1 and the funding txid.
pub fn get_funded_wallet() -> (Wallet, Block, Txid) {
    let mut wallet = new_wallet();
    let foo = wallet.new_address("foo").script_pubkey;
    let tx = payment(&mut wallet, "funding", foo, Amount::ONE_BTC);
    let txid = tx.compute_txid();
    let block1 = block(genesis_block().block_hash(), 1, 0, vec![tx]);
    wallet.apply_block(&block1, 1).unwrap();
    (wallet, block1, txid)
}
