//! An in-process network of tally wallets.
//!
//! Every [`Node`] keeps its own best chain and mempool and feeds both to its [`Wallet`]. Nodes
//! relay blocks and transactions over links; removing a link partitions the network so each side
//! can build a competing history. When links are restored the longest chain wins and the losing
//! side reorganizes, which the wallets see as block disconnects followed by connects.

pub mod utils;

mod node;
pub use node::Node;

use std::cmp::Reverse;
use std::collections::{BTreeSet, VecDeque};

use anyhow::{bail, Context};
use bitcoin::{Amount, BlockHash, ScriptBuf, Transaction, Txid};
use log::{debug, info};
use tally_wallet::{Wallet, WalletParams};
use utils::{block_id, foreign_spk, genesis_block, new_block, SUBSIDY};

pub use anyhow;
pub use bitcoin;
pub use tally_wallet;

/// Blocks in the chain every network starts with.
pub const CACHED_CHAIN_LENGTH: u32 = 200;

/// Blocks each miner mines in a row while building the cached chain.
const MINING_RUN: u32 = 25;

/// Miners taking turns while building the cached chain.
const CACHED_MINERS: u32 = 4;

/// A set of [`Node`]s and the links between them.
#[derive(Debug)]
pub struct TestNetwork {
    nodes: Vec<Node>,
    links: BTreeSet<(usize, usize)>,
}

fn link(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

impl TestNetwork {
    /// Start `n` nodes linked in a line, sharing a chain of [`CACHED_CHAIN_LENGTH`] blocks.
    ///
    /// Miners take turns mining [`MINING_RUN`] blocks each. Miner `i` pays node `i`, or a foreign
    /// script if there are fewer nodes. With the default coinbase maturity each of the first four
    /// nodes ends up with 25 mature coinbases of [`SUBSIDY`].
    pub fn new(n: usize) -> anyhow::Result<Self> {
        let genesis = genesis_block();
        let genesis_id = block_id(&genesis, 0);
        let nodes = (0..n)
            .map(|i| {
                let mut seed = [0_u8; 32];
                seed[..8].copy_from_slice(&(i as u64).to_le_bytes());
                seed[31] = 0x7a;
                let wallet = Wallet::create(WalletParams::new(genesis_id).seed(seed));
                Node::new(wallet, genesis.clone())
            })
            .collect::<Vec<_>>();
        let links = (1..n).map(|i| link(i - 1, i)).collect();
        let mut network = Self { nodes, links };

        let mut prev = genesis.block_hash();
        for height in 1..=CACHED_CHAIN_LENGTH {
            let miner = ((height - 1) % (MINING_RUN * CACHED_MINERS)) / MINING_RUN;
            let script_pubkey = match network.nodes.get_mut(miner as usize) {
                Some(node) => node.wallet_mut().new_address("").script_pubkey,
                None => foreign_spk(&format!("miner-{}", miner)),
            };
            let coinbase = utils::coinbase_tx(height, script_pubkey, SUBSIDY);
            let block = new_block(prev, height, vec![coinbase]);
            prev = block.block_hash();
            for node in &mut network.nodes {
                node.connect_block(block.clone())?;
            }
        }
        info!("started {} nodes at height {}", n, CACHED_CHAIN_LENGTH);
        Ok(network)
    }

    /// The node at `index`.
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// The wallet of the node at `index`.
    pub fn wallet(&self, index: usize) -> &Wallet {
        self.nodes[index].wallet()
    }

    /// The wallet of the node at `index`, mutably.
    pub fn wallet_mut(&mut self, index: usize) -> &mut Wallet {
        self.nodes[index].wallet_mut()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the network has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes reachable from `start`, including `start`.
    fn component(&self, start: usize) -> Vec<usize> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &(a, b) in &self.links {
                let other = match (a == node, b == node) {
                    (true, _) => b,
                    (_, true) => a,
                    _ => continue,
                };
                if seen.insert(other) {
                    queue.push_back(other);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Link `a` and `b`, then let the joined component agree on the longest chain and share
    /// mempools.
    pub fn connect(&mut self, a: usize, b: usize) -> anyhow::Result<()> {
        self.links.insert(link(a, b));
        debug!("linked {} and {}", a, b);
        self.relay(a)
    }

    /// Remove the link between `a` and `b`.
    pub fn disconnect(&mut self, a: usize, b: usize) {
        self.links.remove(&link(a, b));
        debug!("unlinked {} and {}", a, b);
    }

    /// Cut the line in the middle, separating the first half of the nodes from the second.
    pub fn split(&mut self) {
        let mid = self.nodes.len() / 2;
        if mid > 0 {
            self.disconnect(mid - 1, mid);
        }
    }

    /// Propagate the longest chain and every mempool transaction across the component of `start`.
    fn relay(&mut self, start: usize) -> anyhow::Result<()> {
        let component = self.component(start);
        let best = component
            .iter()
            .copied()
            .max_by_key(|&i| (self.nodes[i].blocks().len(), Reverse(i)))
            .context("component cannot be empty")?;
        let best_chain = self.nodes[best].blocks().to_vec();
        for &i in &component {
            if self.nodes[i].blocks().len() < best_chain.len() {
                info!(
                    "node {} switches to the chain of node {} at height {}",
                    i,
                    best,
                    best_chain.len() - 1
                );
                self.nodes[i].switch_to(&best_chain)?;
            }
        }

        let txs = component
            .iter()
            .flat_map(|&i| self.nodes[i].mempool().to_vec())
            .collect::<Vec<_>>();
        for &i in &component {
            for tx in &txs {
                if let Err(err) = self.nodes[i].accept_to_mempool(tx.clone()) {
                    debug!("node {} rejected relayed tx: {:#}", i, err);
                }
            }
        }
        Ok(())
    }

    /// Mine `count` blocks on `node` and relay them.
    pub fn generate(&mut self, node: usize, count: usize) -> anyhow::Result<Vec<BlockHash>> {
        let hashes = (0..count)
            .map(|_| self.nodes[node].mine_block())
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.relay(node)?;
        Ok(hashes)
    }

    /// Check that `nodes` agree on the tip.
    pub fn sync_blocks(&self, nodes: &[usize]) -> anyhow::Result<()> {
        let mut tips = nodes.iter().map(|&i| (i, self.nodes[i].tip()));
        if let Some((first, tip)) = tips.next() {
            for (i, other) in tips {
                if other != tip {
                    bail!("node {} is at {} but node {} is at {}", i, other, first, tip);
                }
            }
        }
        Ok(())
    }

    /// Submit `tx` to `node` and relay it. Fails if `node` rejects it.
    pub fn send_raw_transaction(&mut self, node: usize, tx: Transaction) -> anyhow::Result<Txid> {
        let txid = tx.compute_txid();
        self.nodes[node].accept_to_mempool(tx)?;
        self.relay(node)?;
        Ok(txid)
    }

    /// Pay from a label of the wallet of `node` and broadcast the payment.
    pub fn send_from(
        &mut self,
        node: usize,
        from: &str,
        script_pubkey: ScriptBuf,
        amount: Amount,
        min_conf: u32,
    ) -> anyhow::Result<Txid> {
        let wallet = self.nodes[node].wallet_mut();
        let txid = wallet.send_from(from, script_pubkey, amount, min_conf)?;
        let tx = wallet.ledger().record(txid)?.tx().as_ref().clone();
        self.send_raw_transaction(node, tx)
    }
}
