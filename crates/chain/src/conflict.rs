//! Detection and traversal of conflicting transactions.
//!
//! Two records conflict when they spend at least one common outpoint. Descendants of a
//! conflicting record conflict as well.
use crate::collections::*;
use crate::tx_store::TxStore;
use bitcoin::{Transaction, Txid};

/// Finds conflicts between records of a [`TxStore`].
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector<'s> {
    store: &'s TxStore,
}

impl<'s> ConflictDetector<'s> {
    /// Creates a detector over `store`.
    pub fn new(store: &'s TxStore) -> Self {
        Self { store }
    }

    /// Txids of records that share an input with `tx`, returned with the input index of `tx` at
    /// which they conflict.
    ///
    /// Descendants of those records are not included, see [`find_conflicts`].
    ///
    /// [`find_conflicts`]: Self::find_conflicts
    pub fn direct_conflicts<'t>(
        &self,
        tx: &'t Transaction,
    ) -> impl Iterator<Item = (usize, Txid)> + 't
    where
        's: 't,
    {
        let store: &'t TxStore = self.store;
        let txid = tx.compute_txid();
        let coinbase = tx.is_coinbase();
        tx.input
            .iter()
            .enumerate()
            .filter(move |_| !coinbase)
            .flat_map(move |(vin, txin)| {
                store
                    .outspends(txin.previous_output)
                    .iter()
                    .map(move |&spender| (vin, spender))
            })
            .filter(move |(_, conflicting)| *conflicting != txid)
    }

    /// Every record conflicting with `tx`: the direct conflicts and all of their descendants.
    pub fn find_conflicts(&self, tx: &Transaction) -> BTreeSet<Txid> {
        let direct = self
            .direct_conflicts(tx)
            .map(|(_, txid)| txid)
            .collect::<Vec<_>>();
        TxDescendants::from_multiple_include_root(self.store, direct, |_, txid| Some(txid))
            .collect()
    }

    /// Creates an iterator that filters and maps descendants of `txid`, excluding `txid` itself.
    ///
    /// The closure receives `(depth, descendant)` where a depth of 1 means the descendant spends
    /// an output of `txid` directly. Returning `None` skips the descendant and everything below
    /// it.
    pub fn walk_descendants<F, O>(&self, txid: Txid, walk_map: F) -> TxDescendants<'s, F>
    where
        F: FnMut(usize, Txid) -> Option<O>,
    {
        TxDescendants::new_exclude_root(self.store, txid, walk_map)
    }

    /// The conflict cluster around `seeds`.
    ///
    /// The cluster is the smallest set containing the seeds that is closed under direct
    /// conflicts, descendants and recorded ancestors. States of records outside of it cannot
    /// depend on records inside of it. Seeds that are not recorded are ignored.
    pub fn cluster<I>(&self, seeds: I) -> BTreeSet<Txid>
    where
        I: IntoIterator<Item = Txid>,
    {
        let mut cluster = BTreeSet::new();
        let mut stack = seeds
            .into_iter()
            .filter(|txid| self.store.contains(*txid))
            .collect::<Vec<_>>();

        while let Some(txid) = stack.pop() {
            if !cluster.insert(txid) {
                continue;
            }
            let record = match self.store.get(txid) {
                Some(record) => record,
                None => continue,
            };
            for outpoint in record.spent_outpoints() {
                if self.store.contains(outpoint.txid) {
                    stack.push(outpoint.txid);
                }
                stack.extend(self.store.outspends(outpoint).iter().copied());
            }
            stack.extend(
                self.store
                    .tx_outspends(txid)
                    .flat_map(|(_, spenders)| spenders.iter().copied()),
            );
        }
        cluster
    }
}

/// An iterator that traverses transaction descendants.
///
/// This `struct` is created by [`ConflictDetector::walk_descendants`].
pub struct TxDescendants<'s, F> {
    store: &'s TxStore,
    visited: HashSet<Txid>,
    stack: Vec<(usize, Txid)>,
    filter_map: F,
}

impl<'s, F> TxDescendants<'s, F> {
    /// Creates a `TxDescendants` that excludes the starting `txid` when iterating.
    pub(crate) fn new_exclude_root(store: &'s TxStore, txid: Txid, filter_map: F) -> Self {
        let mut descendants = Self {
            store,
            visited: Default::default(),
            stack: Default::default(),
            filter_map,
        };
        descendants.populate_stack(1, txid);
        descendants
    }

    /// Creates a `TxDescendants` from multiple starting transactions that includes the starting
    /// `txid`s when iterating.
    pub(crate) fn from_multiple_include_root<I>(store: &'s TxStore, txids: I, filter_map: F) -> Self
    where
        I: IntoIterator<Item = Txid>,
    {
        Self {
            store,
            visited: Default::default(),
            stack: txids.into_iter().map(|txid| (0, txid)).collect(),
            filter_map,
        }
    }

    fn populate_stack(&mut self, depth: usize, txid: Txid) {
        let spend_paths = self
            .store
            .tx_outspends(txid)
            .flat_map(|(_, spends)| spends)
            .map(|&txid| (depth, txid));
        self.stack.extend(spend_paths);
    }
}

impl<'s, F, O> Iterator for TxDescendants<'s, F>
where
    F: FnMut(usize, Txid) -> Option<O>,
{
    type Item = O;

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, txid, item) = loop {
            let (depth, txid) = self.stack.pop()?;
            // visit each transaction once
            if self.visited.insert(txid) {
                if let Some(item) = (self.filter_map)(depth, txid) {
                    break (depth, txid, item);
                }
            }
        };
        self.populate_stack(depth + 1, txid);
        Some(item)
    }
}
