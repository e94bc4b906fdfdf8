#[macro_use]
mod common;

use std::thread;

use bitcoin::{hashes::Hash, Amount, OutPoint, SignedAmount, TxOut, Txid};
use common::*;
use tally_chain::SharedLedger;
use tally_core::{ChainEvent, LabelFilter, TxOrigin};

#[test]
fn readers_never_see_partial_transitions() {
    let ledger = SharedLedger::new(new_ledger(|params| params));
    let rounds = 50u32;

    // each round double-spends the previous round's payment to foo with a payment to bar
    let mut steps = Vec::new();
    for round in 0..rounds {
        let foo_outputs = [TxOutTemplate::new(9_000, Some(3))];
        let bar_outputs = [TxOutTemplate::new(9_000, Some(6))];
        let txs = build_txs(&[
            TxTemplate {
                tx_name: "to_foo",
                inputs: &[TxInTemplate::Bogus(10_000)],
                outputs: &foo_outputs,
                ..Default::default()
            },
            TxTemplate {
                tx_name: "to_bar",
                inputs: &[TxInTemplate::Bogus(10_000)],
                outputs: &bar_outputs,
                ..Default::default()
            },
        ]);
        // both spend the same foreign outpoint
        let outpoint = OutPoint::new(Txid::hash(format!("round-{}", round).as_bytes()), 0);
        let mut to_foo = txs[0].1.clone();
        let mut to_bar = txs[1].1.clone();
        to_foo.input[0].previous_output = outpoint;
        to_bar.input[0].previous_output = outpoint;
        steps.push((outpoint, to_foo, to_bar));
    }

    let writer = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            for (round, (outpoint, to_foo, to_bar)) in steps.into_iter().enumerate() {
                ledger.insert_txout(
                    outpoint,
                    TxOut {
                        value: Amount::from_sat(10_000),
                        script_pubkey: spk_at(u32::MAX),
                    },
                );
                ledger.accept(to_foo, TxOrigin::Observed).unwrap();
                ledger.accept(to_bar.clone(), TxOrigin::Observed).unwrap();
                ledger
                    .on_chain_event(&ChainEvent::connected(
                        chain_block(round as u32 + 1),
                        [to_bar.compute_txid()],
                    ))
                    .unwrap();
            }
        })
    };

    let readers = (0..4)
        .map(|_| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let engine = ledger.read();
                    let total = engine.balance(&LabelFilter::All, 0).unwrap();
                    let foo = engine.balance(&LabelFilter::from("foo"), 0).unwrap();
                    let bar = engine.balance(&LabelFilter::from("bar"), 0).unwrap();
                    // exactly one payment per round counts at any point in time
                    assert_eq!(total.to_sat() % 9_000, 0);
                    assert_eq!(foo + bar, total);
                    assert!(foo <= SignedAmount::from_sat(9_000));
                }
            })
        })
        .collect::<Vec<_>>();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let engine = ledger.read();
    assert_eq!(
        engine.balance(&LabelFilter::from("bar"), 1),
        Ok(SignedAmount::from_sat(9_000 * rounds as i64))
    );
    assert_eq!(
        engine.balance(&LabelFilter::from("foo"), 0),
        Ok(SignedAmount::ZERO)
    );
}
