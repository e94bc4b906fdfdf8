use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context};
use bitcoin::{Amount, Block, BlockHash, OutPoint, Transaction, TxOut, Txid};
use log::{debug, info};
use tally_core::BlockId;
use tally_wallet::Wallet;

use crate::utils::{block_id, coinbase_tx, new_block, SUBSIDY};

/// A node of a [`TestNetwork`]: a best chain, a mempool and the wallet following both.
///
/// [`TestNetwork`]: crate::TestNetwork
#[derive(Debug)]
pub struct Node {
    wallet: Wallet,
    blocks: Vec<Block>,
    mempool: Vec<Transaction>,
}

impl Node {
    pub(crate) fn new(wallet: Wallet, genesis: Block) -> Self {
        Self {
            wallet,
            blocks: vec![genesis],
            mempool: Vec::new(),
        }
    }

    /// The node's wallet.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// The node's wallet, mutably.
    pub fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    /// The best chain, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Height of the best chain.
    pub fn height(&self) -> u32 {
        self.blocks.len() as u32 - 1
    }

    /// Tip of the best chain.
    pub fn tip(&self) -> BlockId {
        let height = self.height();
        block_id(&self.blocks[height as usize], height)
    }

    /// Unconfirmed transactions in the order they were accepted.
    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    fn contains_tx(&self, txid: Txid) -> bool {
        self.blocks
            .iter()
            .flat_map(|block| &block.txdata)
            .chain(&self.mempool)
            .any(|tx| tx.compute_txid() == txid)
    }

    /// Outputs unspent by the best chain and the mempool.
    fn utxo_set(&self) -> HashMap<OutPoint, TxOut> {
        let mut utxos = HashMap::new();
        let txs = self
            .blocks
            .iter()
            .flat_map(|block| &block.txdata)
            .chain(&self.mempool);
        for tx in txs {
            apply_tx(&mut utxos, tx);
        }
        utxos
    }

    /// The output at `outpoint` created by the best chain or the mempool, spent or not.
    fn find_txout(&self, outpoint: OutPoint) -> Option<TxOut> {
        self.blocks
            .iter()
            .flat_map(|block| &block.txdata)
            .chain(&self.mempool)
            .find(|tx| tx.compute_txid() == outpoint.txid)
            .and_then(|tx| tx.output.get(outpoint.vout as usize).cloned())
    }

    /// Tell the wallet about the prevouts of `tx` if `tx` pays to it.
    fn feed_prevouts(&mut self, tx: &Transaction) {
        if tx.is_coinbase() || !self.wallet.ledger().label_index().pays_to_owned(tx) {
            return;
        }
        for txin in &tx.input {
            if let Some(txout) = self.find_txout(txin.previous_output) {
                self.wallet.insert_txout(txin.previous_output, txout);
            }
        }
    }

    /// Add `tx` to the mempool. Returns `false` if the node already has it.
    pub(crate) fn accept_to_mempool(&mut self, tx: Transaction) -> anyhow::Result<bool> {
        let txid = tx.compute_txid();
        if self.contains_tx(txid) {
            return Ok(false);
        }
        if tx.is_coinbase() {
            bail!("{} is a coinbase", txid);
        }
        let utxos = self.utxo_set();
        for txin in &tx.input {
            if !utxos.contains_key(&txin.previous_output) {
                bail!("{} spends missing or spent {}", txid, txin.previous_output);
            }
        }

        self.feed_prevouts(&tx);
        self.wallet
            .apply_unconfirmed_tx(tx.clone())
            .with_context(|| format!("wallet rejected {}", txid))?;
        debug!("accepted {} to mempool at {}", txid, self.tip());
        self.mempool.push(tx);
        Ok(true)
    }

    /// Mine a block with every mempool transaction on top of the tip.
    pub(crate) fn mine_block(&mut self) -> anyhow::Result<BlockHash> {
        let height = self.height() + 1;
        let mut created = HashMap::new();
        for tx in self.blocks.iter().flat_map(|block| &block.txdata) {
            apply_tx(&mut created, tx);
        }
        let mut fees = Amount::ZERO;
        for tx in &self.mempool {
            let input = tx
                .input
                .iter()
                .filter_map(|txin| created.get(&txin.previous_output))
                .map(|txout| txout.value)
                .sum::<Amount>();
            let output = tx.output.iter().map(|txout| txout.value).sum::<Amount>();
            fees += input.checked_sub(output).unwrap_or_default();
            apply_tx(&mut created, tx);
        }

        let script_pubkey = self.wallet.new_address("").script_pubkey;
        let mut txdata = vec![coinbase_tx(height, script_pubkey, SUBSIDY + fees)];
        txdata.append(&mut self.mempool);
        let block = new_block(self.tip().hash, height, txdata);
        let hash = block.block_hash();
        self.connect_block(block)?;
        info!("mined block {} at height {}", hash, height);
        Ok(hash)
    }

    /// Extend the best chain with `block`.
    pub(crate) fn connect_block(&mut self, block: Block) -> anyhow::Result<()> {
        let height = self.height() + 1;
        for tx in &block.txdata {
            self.feed_prevouts(tx);
        }
        self.wallet
            .apply_block(&block, height)
            .with_context(|| format!("wallet rejected block at height {}", height))?;
        self.blocks.push(block);
        Ok(())
    }

    /// Make `chain` the best chain, disconnecting blocks back to the fork point first.
    pub(crate) fn switch_to(&mut self, chain: &[Block]) -> anyhow::Result<()> {
        let fork = self
            .blocks
            .iter()
            .zip(chain)
            .take_while(|(a, b)| a.block_hash() == b.block_hash())
            .count();
        if fork == 0 {
            bail!("chain does not share the genesis block");
        }

        let mut returned = Vec::new();
        while self.blocks.len() > fork {
            let tip = self.tip();
            self.wallet
                .disconnect_block(tip)
                .with_context(|| format!("wallet rejected disconnect of {}", tip))?;
            if let Some(block) = self.blocks.pop() {
                returned.push(block.txdata.into_iter().filter(|tx| !tx.is_coinbase()));
            }
            info!("disconnected {}", tip);
        }
        // oldest block first so parents come before children
        let mut pending = returned.into_iter().rev().flatten().collect::<Vec<_>>();
        pending.append(&mut self.mempool);

        for block in &chain[fork..] {
            self.connect_block(block.clone())?;
        }
        self.rebuild_mempool(pending);
        Ok(())
    }

    /// Keep the transactions of `pending` that are neither mined nor double-spent by the chain.
    fn rebuild_mempool(&mut self, pending: Vec<Transaction>) {
        let mut utxos = HashMap::new();
        let mut mined = HashSet::new();
        for tx in self.blocks.iter().flat_map(|block| &block.txdata) {
            mined.insert(tx.compute_txid());
            apply_tx(&mut utxos, tx);
        }
        for tx in pending {
            let txid = tx.compute_txid();
            if mined.contains(&txid) {
                continue;
            }
            if tx
                .input
                .iter()
                .all(|txin| utxos.contains_key(&txin.previous_output))
            {
                apply_tx(&mut utxos, &tx);
                self.mempool.push(tx);
            } else {
                debug!("evicted {} from mempool", txid);
            }
        }
    }
}

fn apply_tx(utxos: &mut HashMap<OutPoint, TxOut>, tx: &Transaction) {
    if !tx.is_coinbase() {
        for txin in &tx.input {
            utxos.remove(&txin.previous_output);
        }
    }
    let txid = tx.compute_txid();
    for (vout, txout) in tx.output.iter().enumerate() {
        utxos.insert(OutPoint::new(txid, vout as u32), txout.clone());
    }
}
