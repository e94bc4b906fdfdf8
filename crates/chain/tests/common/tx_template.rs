use std::collections::{BTreeMap, HashMap};

use bitcoin::{
    absolute::LockTime, hashes::Hash, transaction, Amount, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use tally_chain::LedgerEngine;
use tally_core::{ChainEvent, TxOrigin};

use super::{chain_block, spk_at};

/// Transaction template.
#[derive(Clone, Copy, Default)]
pub struct TxTemplate<'a> {
    /// Uniquely identifies the transaction, before it can have a txid.
    pub tx_name: &'a str,
    pub inputs: &'a [TxInTemplate<'a>],
    pub outputs: &'a [TxOutTemplate],
    /// `Some(label)` marks a wallet send from `label`.
    pub from: Option<&'a str>,
    /// Height of the block including the transaction.
    pub confirmed_at: Option<u32>,
}

#[allow(dead_code)]
#[derive(Clone, Copy)]
pub enum TxInTemplate<'a> {
    /// Spends a foreign output of the given value, inserted as a floating txout.
    Bogus(u64),

    /// This is used for coinbase transactions because they do not have previous outputs.
    Coinbase,

    /// Contains the `tx_name` and `vout` that we are spending. The rule is that we must only spend
    /// a previous transaction.
    PrevTx(&'a str, u32),
}

#[derive(Clone, Copy)]
pub struct TxOutTemplate {
    pub value: u64,
    /// `Some(index)` pays to [`spk_at`], `None` pays to a foreign script.
    pub spk_index: Option<u32>,
}

impl TxOutTemplate {
    pub const fn new(value: u64, spk_index: Option<u32>) -> Self {
        TxOutTemplate { value, spk_index }
    }
}

/// Build the transactions of `tx_templates` in order.
pub fn build_txs<'a>(tx_templates: &[TxTemplate<'a>]) -> Vec<(TxTemplate<'a>, Transaction)> {
    let mut tx_ids = HashMap::<&str, Txid>::new();
    let mut txs = Vec::new();
    for (index, tmp) in tx_templates.iter().enumerate() {
        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time: LockTime::from_consensus(index as u32),
            input: tmp
                .inputs
                .iter()
                .enumerate()
                .map(|(vin, input)| match input {
                    TxInTemplate::Bogus(_) => TxIn {
                        previous_output: bogus_outpoint(index, vin),
                        script_sig: ScriptBuf::new(),
                        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                        witness: Witness::new(),
                    },
                    TxInTemplate::Coinbase => TxIn {
                        previous_output: OutPoint::null(),
                        script_sig: ScriptBuf::from_bytes(index.to_le_bytes().to_vec()),
                        sequence: Sequence::MAX,
                        witness: Witness::new(),
                    },
                    TxInTemplate::PrevTx(prev_name, prev_vout) => {
                        let prev_txid = tx_ids.get(prev_name).expect(
                            "txin template must spend from tx of template that comes before",
                        );
                        TxIn {
                            previous_output: OutPoint::new(*prev_txid, *prev_vout),
                            script_sig: ScriptBuf::new(),
                            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                            witness: Witness::new(),
                        }
                    }
                })
                .collect(),
            output: tmp
                .outputs
                .iter()
                .map(|output| TxOut {
                    value: Amount::from_sat(output.value),
                    script_pubkey: match output.spk_index {
                        Some(index) => spk_at(index),
                        None => spk_at(u32::MAX),
                    },
                })
                .collect(),
        };
        tx_ids.insert(tmp.tx_name, tx.compute_txid());
        txs.push((*tmp, tx));
    }
    txs
}

fn bogus_outpoint(tx_index: usize, vin: usize) -> OutPoint {
    OutPoint::new(
        Txid::hash(format!("bogus-{}-{}", tx_index, vin).as_bytes()),
        0,
    )
}

/// Accept every template in order, then connect blocks `1..=tip_height` including the
/// transactions confirmed at each height.
pub fn init_ledger<'a>(
    engine: &mut LedgerEngine,
    tx_templates: &[TxTemplate<'a>],
    tip_height: u32,
) -> HashMap<&'a str, Txid> {
    let mut tx_ids = HashMap::new();
    let mut blocks = BTreeMap::<u32, Vec<Txid>>::new();
    for (index, (tmp, tx)) in build_txs(tx_templates).into_iter().enumerate() {
        for (vin, input) in tmp.inputs.iter().enumerate() {
            if let TxInTemplate::Bogus(value) = input {
                engine.insert_txout(
                    bogus_outpoint(index, vin),
                    TxOut {
                        value: Amount::from_sat(*value),
                        script_pubkey: ScriptBuf::new(),
                    },
                );
            }
        }
        let origin = match tmp.from {
            Some(label) => TxOrigin::wallet(label),
            None => TxOrigin::Observed,
        };
        let txid = engine.accept(tx, origin).expect("template must be valid").txid();
        tx_ids.insert(tmp.tx_name, txid);
        if let Some(height) = tmp.confirmed_at {
            blocks.entry(height).or_default().push(txid);
        }
    }
    for height in 1..=tip_height {
        let txids = blocks.remove(&height).unwrap_or_default();
        engine
            .on_chain_event(&ChainEvent::connected(chain_block(height), txids))
            .expect("blocks must connect");
    }
    tx_ids
}
