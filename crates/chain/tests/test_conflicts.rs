#[macro_use]
mod common;

use std::collections::{BTreeSet, HashMap};

use bitcoin::{SignedAmount, Txid};
use common::*;
use tally_chain::{ConflictDetector, LedgerEngine};
use tally_core::{LabelFilter, TxState};

#[derive(Debug, Clone, Copy)]
enum ExpState<'a> {
    Pending,
    Confirmed(u32),
    Conflicted(&'a str),
}

struct Scenario<'a> {
    /// Name of the test scenario
    name: &'a str,
    /// Transaction templates, accepted in order
    tx_templates: &'a [TxTemplate<'a>],
    /// Height of the tip once every block is connected
    tip_height: u32,
    /// Expected state of each transaction
    exp_states: &'a [(&'a str, ExpState<'a>)],
    /// Expected signed confirmation counts
    exp_confirmations: &'a [(&'a str, i64)],
    /// Expected balances per label at zero confirmations
    exp_balances: &'a [(&'a str, i64)],
}

const FUNDING: TxTemplate<'static> = TxTemplate {
    tx_name: "funding",
    inputs: &[TxInTemplate::Bogus(100_000)],
    outputs: &const { [TxOutTemplate::new(100_000, Some(0))] },
    from: None,
    confirmed_at: Some(1),
};

fn assert_invariants(engine: &LedgerEngine) {
    let store = engine.store();
    let detector = ConflictDetector::new(store);
    for record in store.iter() {
        // conflicts are symmetric
        for (_, other) in detector.direct_conflicts(record.tx()) {
            let other = store.get(other).expect("conflict must be recorded");
            assert!(
                detector
                    .direct_conflicts(other.tx())
                    .any(|(_, txid)| txid == record.txid()),
                "conflict between {} and {} must be symmetric",
                record.txid(),
                other.txid()
            );
        }
        // at most one non-conflicted spender per outpoint
        for outpoint in record.spent_outpoints() {
            let canonical = store
                .outspends(outpoint)
                .iter()
                .filter(|txid| !store.get(**txid).unwrap().state().is_conflicted())
                .count();
            assert!(canonical <= 1, "{} has {} spenders", outpoint, canonical);
        }
        // a conflicted record mirrors its winner
        if let TxState::Conflicted(winner) = record.state() {
            let winner_confs = engine.confirmations(winner).unwrap();
            assert_eq!(engine.confirmations(record.txid()).unwrap(), -winner_confs);
        }
    }
    // labels partition the wallet
    let by_label = engine
        .balances_by_label(0)
        .into_values()
        .fold(SignedAmount::ZERO, |acc, v| acc + v);
    assert_eq!(by_label, engine.balance(&LabelFilter::All, 0).unwrap());
}

#[test]
fn test_conflict_resolution() {
    let scenarios = [
        Scenario {
            name: "newer pending double-spend wins",
            tx_templates: &[
                FUNDING,
                TxTemplate {
                    tx_name: "a",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [
                        TxOutTemplate::new(60_000, Some(3)),
                        TxOutTemplate::new(39_000, Some(9)),
                    ] },
                    from: Some(""),
                    ..Default::default()
                },
                TxTemplate {
                    tx_name: "b",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(90_000, None)] },
                    from: Some(""),
                    ..Default::default()
                },
            ],
            tip_height: 3,
            exp_states: &[
                ("funding", ExpState::Confirmed(1)),
                ("a", ExpState::Conflicted("b")),
                ("b", ExpState::Pending),
            ],
            exp_confirmations: &[("funding", 3), ("a", 0), ("b", 0)],
            exp_balances: &[("", 0), ("foo", 0), ("bar", 0), ("*", 0)],
        },
        Scenario {
            name: "confirmed transaction wins over newer pending conflict",
            tx_templates: &[
                FUNDING,
                TxTemplate {
                    tx_name: "a",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [
                        TxOutTemplate::new(60_000, Some(3)),
                        TxOutTemplate::new(39_000, Some(9)),
                    ] },
                    from: Some(""),
                    confirmed_at: Some(2),
                },
                TxTemplate {
                    tx_name: "b",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(90_000, None)] },
                    from: Some(""),
                    ..Default::default()
                },
            ],
            tip_height: 3,
            exp_states: &[
                ("funding", ExpState::Confirmed(1)),
                ("a", ExpState::Confirmed(2)),
                ("b", ExpState::Conflicted("a")),
            ],
            exp_confirmations: &[("funding", 3), ("a", 2), ("b", -2)],
            exp_balances: &[("", 39_000), ("foo", 60_000), ("bar", 0), ("*", 99_000)],
        },
        Scenario {
            name: "descendants of a conflicted transaction are conflicted",
            tx_templates: &[
                FUNDING,
                TxTemplate {
                    tx_name: "a",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [
                        TxOutTemplate::new(60_000, Some(3)),
                        TxOutTemplate::new(39_000, Some(9)),
                    ] },
                    from: Some(""),
                    ..Default::default()
                },
                TxTemplate {
                    tx_name: "a_child",
                    inputs: &[TxInTemplate::PrevTx("a", 0)],
                    outputs: &const { [TxOutTemplate::new(59_000, Some(6))] },
                    from: Some("foo"),
                    ..Default::default()
                },
                TxTemplate {
                    tx_name: "b",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(99_000, Some(1))] },
                    from: Some(""),
                    ..Default::default()
                },
            ],
            tip_height: 1,
            exp_states: &[
                ("funding", ExpState::Confirmed(1)),
                ("a", ExpState::Conflicted("b")),
                ("a_child", ExpState::Conflicted("b")),
                ("b", ExpState::Pending),
            ],
            exp_confirmations: &[("a", 0), ("a_child", 0), ("b", 0)],
            exp_balances: &[("", 99_000), ("foo", 0), ("bar", 0), ("*", 99_000)],
        },
        Scenario {
            name: "newest child revives its conflicted parent",
            tx_templates: &[
                FUNDING,
                TxTemplate {
                    tx_name: "a",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [
                        TxOutTemplate::new(60_000, Some(3)),
                        TxOutTemplate::new(39_000, Some(9)),
                    ] },
                    from: Some(""),
                    ..Default::default()
                },
                TxTemplate {
                    tx_name: "b",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(99_000, Some(1))] },
                    from: Some(""),
                    ..Default::default()
                },
                TxTemplate {
                    tx_name: "a_child",
                    inputs: &[TxInTemplate::PrevTx("a", 0)],
                    outputs: &const { [TxOutTemplate::new(59_000, Some(6))] },
                    from: Some("foo"),
                    ..Default::default()
                },
            ],
            tip_height: 1,
            exp_states: &[
                ("a", ExpState::Pending),
                ("b", ExpState::Conflicted("a")),
                ("a_child", ExpState::Pending),
            ],
            exp_confirmations: &[("a", 0), ("b", 0), ("a_child", 0)],
            exp_balances: &[("", 39_000), ("foo", 0), ("bar", 59_000), ("*", 98_000)],
        },
        Scenario {
            name: "three-way conflict resolves to the confirmed transaction",
            tx_templates: &[
                FUNDING,
                TxTemplate {
                    tx_name: "a",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(90_000, None)] },
                    from: Some(""),
                    ..Default::default()
                },
                TxTemplate {
                    tx_name: "b",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(80_000, None)] },
                    from: Some(""),
                    confirmed_at: Some(2),
                },
                TxTemplate {
                    tx_name: "c",
                    inputs: &[TxInTemplate::PrevTx("funding", 0)],
                    outputs: &const { [TxOutTemplate::new(70_000, None)] },
                    from: Some(""),
                    ..Default::default()
                },
            ],
            tip_height: 4,
            exp_states: &[
                ("a", ExpState::Conflicted("b")),
                ("b", ExpState::Confirmed(2)),
                ("c", ExpState::Conflicted("b")),
            ],
            exp_confirmations: &[("a", -3), ("b", 3), ("c", -3)],
            exp_balances: &[("", 0), ("*", 0)],
        },
        Scenario {
            name: "observed payment credits the receiving label",
            tx_templates: &[TxTemplate {
                tx_name: "incoming",
                inputs: &[TxInTemplate::Bogus(20_000)],
                outputs: &const { [
                    TxOutTemplate::new(5_000, Some(4)),
                    TxOutTemplate::new(14_000, None),
                ] },
                ..Default::default()
            }],
            tip_height: 0,
            exp_states: &[("incoming", ExpState::Pending)],
            exp_confirmations: &[("incoming", 0)],
            exp_balances: &[("", 0), ("foo", 5_000), ("*", 5_000)],
        },
    ];

    for scenario in scenarios {
        let mut engine = new_ledger(|params| params);
        let tx_ids = init_ledger(&mut engine, scenario.tx_templates, scenario.tip_height);
        let txid = |name: &str| -> Txid { tx_ids[name] };

        for (name, exp) in scenario.exp_states {
            let exp = match exp {
                ExpState::Pending => TxState::Pending,
                ExpState::Confirmed(height) => TxState::Confirmed(chain_block(*height)),
                ExpState::Conflicted(winner) => TxState::Conflicted(txid(winner)),
            };
            assert_eq!(
                engine.state(txid(name)).unwrap(),
                exp,
                "\n[{}] state of '{}'",
                scenario.name,
                name
            );
        }
        for (name, exp) in scenario.exp_confirmations {
            assert_eq!(
                engine.confirmations(txid(name)).unwrap(),
                *exp,
                "\n[{}] confirmations of '{}'",
                scenario.name,
                name
            );
        }
        for (label, exp) in scenario.exp_balances {
            let filter: LabelFilter = label.parse().unwrap();
            assert_eq!(
                engine.balance(&filter, 0).unwrap(),
                SignedAmount::from_sat(*exp),
                "\n[{}] balance of '{}'",
                scenario.name,
                label
            );
        }
        assert_invariants(&engine);
    }
}

#[test]
fn find_conflicts_includes_descendants() {
    let mut engine = new_ledger(|params| params);
    let tx_ids = init_ledger(
        &mut engine,
        &[
            FUNDING,
            TxTemplate {
                tx_name: "a",
                inputs: &[TxInTemplate::PrevTx("funding", 0)],
                outputs: &const { [TxOutTemplate::new(99_000, Some(3))] },
                from: Some(""),
                ..Default::default()
            },
            TxTemplate {
                tx_name: "a_child",
                inputs: &[TxInTemplate::PrevTx("a", 0)],
                outputs: &const { [TxOutTemplate::new(98_000, Some(6))] },
                from: Some("foo"),
                ..Default::default()
            },
            TxTemplate {
                tx_name: "b",
                inputs: &[TxInTemplate::PrevTx("funding", 0)],
                outputs: &const { [TxOutTemplate::new(99_000, None)] },
                from: Some(""),
                ..Default::default()
            },
        ],
        1,
    );

    assert_eq!(
        engine.find_conflicts(tx_ids["b"]).unwrap(),
        [tx_ids["a"], tx_ids["a_child"]].into_iter().collect::<BTreeSet<_>>()
    );
    assert_eq!(
        engine.find_conflicts(tx_ids["a"]).unwrap(),
        [tx_ids["b"]].into_iter().collect::<BTreeSet<_>>()
    );
    assert!(engine.find_conflicts(tx_ids["funding"]).unwrap().is_empty());
}

#[test]
fn coinbase_credit_waits_for_maturity() {
    let mut engine = new_ledger(|params| params.coinbase_maturity(2));
    let tx_ids: HashMap<&str, Txid> = init_ledger(
        &mut engine,
        &[TxTemplate {
            tx_name: "coinbase",
            inputs: &[TxInTemplate::Coinbase],
            outputs: &const { [TxOutTemplate::new(50_000, Some(6))] },
            confirmed_at: Some(1),
            ..Default::default()
        }],
        2,
    );
    let bar = LabelFilter::from("bar");
    assert_eq!(engine.confirmations(tx_ids["coinbase"]), Ok(2));
    assert_eq!(engine.balance(&bar, 0), Ok(SignedAmount::ZERO));

    engine
        .on_chain_event(&tally_core::ChainEvent::connected(chain_block(3), []))
        .unwrap();
    assert_eq!(engine.balance(&bar, 0), Ok(SignedAmount::from_sat(50_000)));
    assert_eq!(engine.fee(tx_ids["coinbase"]), Ok(Some(bitcoin::Amount::ZERO)));
}

#[test]
fn debit_label_without_scripts_joins_the_partition() {
    let mut engine = new_ledger(|params| params);
    let tx_ids = init_ledger(
        &mut engine,
        &[
            TxTemplate {
                tx_name: "funding",
                inputs: &[TxInTemplate::Bogus(100_000)],
                outputs: &const { [TxOutTemplate::new(100_000, Some(0))] },
                confirmed_at: Some(1),
                ..Default::default()
            },
            TxTemplate {
                tx_name: "spend",
                inputs: &[TxInTemplate::PrevTx("funding", 0)],
                outputs: &const { [TxOutTemplate::new(99_000, None)] },
                from: Some("savings"),
                ..Default::default()
            },
        ],
        1,
    );
    assert_eq!(engine.state(tx_ids["spend"]), Ok(TxState::Pending));

    let savings = LabelFilter::from("savings");
    assert!(engine.labels().any(|label| label.as_str() == "savings"));
    assert_eq!(
        engine.balance(&savings, 0),
        Ok(SignedAmount::from_sat(-100_000))
    );

    let sum_over_labels = engine
        .labels()
        .map(|label| engine.balance(&LabelFilter::Only(label.clone()), 0).unwrap())
        .fold(SignedAmount::ZERO, |acc, amount| acc + amount);
    assert_eq!(engine.balance(&LabelFilter::All, 0), Ok(sum_over_labels));
    assert_eq!(sum_over_labels, SignedAmount::ZERO);
}
