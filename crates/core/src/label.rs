use core::fmt;
use core::str::FromStr;

/// A user-assigned name grouping one or more owned scripts.
///
/// A label is not an account with its own coins. It is a filter over output ownership that is
/// applied when balances are aggregated. The empty label is the default bucket that every
/// unlabeled script belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Label(String);

impl Label {
    /// Construct a label from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name of the label.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the default (empty) label.
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Label {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Selects which labels a balance query aggregates over.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelFilter {
    /// Every label, including the default one.
    All,
    /// A single label.
    Only(Label),
}

impl LabelFilter {
    /// The label name that selects every label.
    pub const WILDCARD: &'static str = "*";

    /// Whether `label` passes this filter.
    pub fn matches(&self, label: &Label) -> bool {
        match self {
            LabelFilter::All => true,
            LabelFilter::Only(only) => only == label,
        }
    }
}

impl From<Label> for LabelFilter {
    fn from(label: Label) -> Self {
        Self::Only(label)
    }
}

impl From<&str> for LabelFilter {
    fn from(name: &str) -> Self {
        if name == Self::WILDCARD {
            Self::All
        } else {
            Self::Only(Label::new(name))
        }
    }
}

impl FromStr for LabelFilter {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::All => write!(f, "{}", Self::WILDCARD),
            LabelFilter::Only(label) => label.fmt(f),
        }
    }
}

/// Types of keychains an owned script is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum KeychainKind {
    /// Receiving scripts handed out to payers.
    External = 0,
    /// Change scripts the wallet pays back to itself.
    Internal = 1,
}

impl KeychainKind {
    /// Return [`KeychainKind`] as a byte
    pub fn as_byte(&self) -> u8 {
        match self {
            KeychainKind::External => b'e',
            KeychainKind::Internal => b'i',
        }
    }
}
