//! Ownership of scripts and the label each owned script belongs to.
use crate::collections::{BTreeMap, BTreeSet};
use bitcoin::{Script, ScriptBuf, Transaction};
use tally_core::{KeychainKind, Label};

/// The label and keychain of an owned script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SpkOwner {
    /// The label the script belongs to.
    pub label: Label,
    /// Whether the script was handed out for receiving or for change.
    pub keychain: KeychainKind,
}

/// An index of the script pubkeys the wallet owns.
///
/// Each owned script belongs to exactly one [`Label`]. The default label `""` always exists, even
/// before any script is assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIndex {
    spks: BTreeMap<ScriptBuf, SpkOwner>,
    labels: BTreeSet<Label>,
}

impl Default for LabelIndex {
    fn default() -> Self {
        Self {
            spks: BTreeMap::new(),
            labels: core::iter::once(Label::default()).collect(),
        }
    }
}

impl LabelIndex {
    /// Adds `spk` to the owned set under `label`.
    ///
    /// Returns `false` and leaves the index untouched if the script is already owned. Use
    /// [`set_label`] to move an owned script to another label.
    ///
    /// [`set_label`]: Self::set_label
    pub fn insert_spk(&mut self, spk: ScriptBuf, label: Label, keychain: KeychainKind) -> bool {
        if self.spks.contains_key(&spk) {
            return false;
        }
        self.labels.insert(label.clone());
        self.spks.insert(spk, SpkOwner { label, keychain });
        true
    }

    /// Moves an owned script to `label`. Returns the previous label, or `None` if the script is not
    /// owned.
    pub fn set_label(&mut self, spk: &Script, label: Label) -> Option<Label> {
        let owner = self.spks.get_mut(spk)?;
        self.labels.insert(label.clone());
        Some(core::mem::replace(&mut owner.label, label))
    }

    /// Registers a label that has no scripts yet.
    pub fn insert_label(&mut self, label: Label) -> bool {
        self.labels.insert(label)
    }

    /// Who owns `spk`, if anyone.
    pub fn owner(&self, spk: &Script) -> Option<&SpkOwner> {
        self.spks.get(spk)
    }

    /// The label of `spk` if it is owned.
    pub fn label_of(&self, spk: &Script) -> Option<&Label> {
        self.owner(spk).map(|owner| &owner.label)
    }

    /// Whether `spk` is owned.
    pub fn is_mine(&self, spk: &Script) -> bool {
        self.spks.contains_key(spk)
    }

    /// Whether `spk` is an owned change script.
    pub fn is_change(&self, spk: &Script) -> bool {
        matches!(
            self.owner(spk),
            Some(SpkOwner {
                keychain: KeychainKind::Internal,
                ..
            })
        )
    }

    /// Whether any output of `tx` pays to an owned script.
    ///
    /// Inputs are not considered here since resolving them needs the spent outputs. See
    /// [`LedgerEngine::is_relevant`](crate::LedgerEngine::is_relevant).
    pub fn pays_to_owned(&self, tx: &Transaction) -> bool {
        tx.output.iter().any(|txout| self.is_mine(&txout.script_pubkey))
    }

    /// Whether `label` is known.
    pub fn contains_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Every known label in order. The default label comes first.
    pub fn labels(&self) -> impl ExactSizeIterator<Item = &Label> + '_ {
        self.labels.iter()
    }

    /// Owned scripts of `label` with their keychain.
    pub fn spks_of_label<'a>(
        &'a self,
        label: &'a Label,
    ) -> impl Iterator<Item = (&'a Script, KeychainKind)> + 'a {
        self.spks
            .iter()
            .filter(move |(_, owner)| &owner.label == label)
            .map(|(spk, owner)| (spk.as_script(), owner.keychain))
    }

    /// All owned scripts.
    pub fn all_spks(&self) -> impl ExactSizeIterator<Item = (&Script, &SpkOwner)> + '_ {
        self.spks.iter().map(|(spk, owner)| (spk.as_script(), owner))
    }

    /// Number of owned scripts.
    pub fn len(&self) -> usize {
        self.spks.len()
    }

    /// Whether no script is owned.
    pub fn is_empty(&self) -> bool {
        self.spks.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::WPubkeyHash;

    fn spk(seed: &[u8]) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(seed))
    }

    #[test]
    fn default_label_always_exists() {
        let index = LabelIndex::default();
        assert!(index.contains_label(&Label::default()));
        assert_eq!(index.labels().count(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn script_belongs_to_one_label() {
        let mut index = LabelIndex::default();
        let foo = spk(b"foo");
        assert!(index.insert_spk(foo.clone(), "foo".into(), KeychainKind::External));
        assert!(!index.insert_spk(foo.clone(), "bar".into(), KeychainKind::External));
        assert_eq!(index.label_of(&foo), Some(&Label::from("foo")));
        assert!(!index.contains_label(&Label::from("bar")));

        assert_eq!(index.set_label(&foo, "bar".into()), Some(Label::from("foo")));
        assert_eq!(index.label_of(&foo), Some(&Label::from("bar")));
        assert_eq!(index.spks_of_label(&Label::from("foo")).count(), 0);
        assert_eq!(index.spks_of_label(&Label::from("bar")).count(), 1);
    }

    #[test]
    fn change_scripts() {
        let mut index = LabelIndex::default();
        let change = spk(b"change");
        let recv = spk(b"recv");
        index.insert_spk(change.clone(), Label::default(), KeychainKind::Internal);
        index.insert_spk(recv.clone(), Label::default(), KeychainKind::External);
        assert!(index.is_change(&change));
        assert!(!index.is_change(&recv));
        assert!(!index.is_change(&spk(b"unknown")));
        assert_eq!(index.set_label(&spk(b"unknown"), "x".into()), None);
    }
}
