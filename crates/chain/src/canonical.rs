//! Resolution of record states within a conflict cluster.
use crate::collections::*;
use crate::{ChainView, ConflictDetector, TxStore};
use bitcoin::Txid;
use core::cmp::Reverse;
use log::warn;
use tally_core::{BlockId, TxState};

/// Decides which records of a conflict cluster are canonical.
///
/// Records are visited in priority order: first those included in the best chain by ascending
/// height, then pending ones by descending `last_seen` with ties broken by descending txid. A
/// visited record and all of its ancestors become canonical. Every record that directly conflicts
/// with a canonical record becomes conflicted, along with all of its descendants, and remembers
/// that canonical record as its winner.
pub(crate) struct Canonicalizer<'s, C> {
    store: &'s TxStore,
    chain: &'s C,
    canonical: HashSet<Txid>,
    not_canonical: HashMap<Txid, Txid>,
}

impl<'s, C: ChainView> Canonicalizer<'s, C> {
    /// Creates a canonicalizer over `store` for the best chain `chain`.
    pub(crate) fn new(store: &'s TxStore, chain: &'s C) -> Self {
        Self {
            store,
            chain,
            canonical: HashSet::new(),
            not_canonical: HashMap::new(),
        }
    }

    /// Resolve the state of every record of `cluster`.
    ///
    /// `cluster` must be closed under conflicts, descendants and recorded ancestors, see
    /// [`ConflictDetector::cluster`]. Txids without a record are skipped.
    pub(crate) fn resolve(mut self, cluster: &BTreeSet<Txid>) -> BTreeMap<Txid, TxState> {
        let mut confirmed = Vec::<(u32, Txid)>::new();
        let mut pending = Vec::<(Reverse<u64>, Reverse<Txid>)>::new();
        for &txid in cluster {
            let record = match self.store.get(txid) {
                Some(record) => record,
                None => continue,
            };
            match self.chain.inclusion(txid) {
                Some(block) => confirmed.push((block.height, txid)),
                None => pending.push((Reverse(record.last_seen()), Reverse(txid))),
            }
        }
        confirmed.sort();
        pending.sort();

        let order = confirmed
            .into_iter()
            .map(|(_, txid)| txid)
            .chain(pending.into_iter().map(|(_, Reverse(txid))| txid));
        for txid in order {
            if self.canonical.contains(&txid) || self.not_canonical.contains_key(&txid) {
                continue;
            }
            self.mark_canonical(txid);
        }

        cluster
            .iter()
            .filter(|txid| self.store.contains(**txid))
            .map(|&txid| (txid, self.state_of(txid)))
            .collect()
    }

    fn state_of(&self, txid: Txid) -> TxState {
        let inclusion: Option<BlockId> = self.chain.inclusion(txid);
        match (inclusion, self.not_canonical.get(&txid)) {
            (Some(block), None) => TxState::Confirmed(block),
            (Some(block), Some(winner)) => {
                warn!(
                    "{} is included in {} but conflicts with {}",
                    txid, block, winner
                );
                TxState::Confirmed(block)
            }
            (None, Some(winner)) => TxState::Conflicted(*winner),
            (None, None) => TxState::Pending,
        }
    }

    /// Marks `txid` and its recorded ancestors canonical and their conflicts not canonical.
    fn mark_canonical(&mut self, txid: Txid) {
        let store = self.store;
        let detector = ConflictDetector::new(store);
        let mut stack = vec![txid];
        while let Some(txid) = stack.pop() {
            if !self.canonical.insert(txid) {
                continue;
            }
            let record = match store.get(txid) {
                Some(record) => record,
                None => continue,
            };
            let conflicts = detector
                .direct_conflicts(record.tx())
                .map(|(_, conflict)| conflict)
                .collect::<Vec<_>>();
            for conflict in conflicts {
                self.mark_not_canonical(conflict, txid);
            }
            stack.extend(store.parents(txid));
        }
    }

    fn mark_not_canonical(&mut self, txid: Txid, winner: Txid) {
        if self.canonical.contains(&txid) {
            return;
        }
        let not_canonical = &mut self.not_canonical;
        let canonical = &self.canonical;
        if not_canonical.contains_key(&txid) {
            return;
        }
        not_canonical.insert(txid, winner);
        ConflictDetector::new(self.store)
            .walk_descendants(txid, |_, descendant| {
                if canonical.contains(&descendant) || not_canonical.contains_key(&descendant) {
                    return None;
                }
                not_canonical.insert(descendant, winner);
                Some(())
            })
            .for_each(|_| {});
    }
}
