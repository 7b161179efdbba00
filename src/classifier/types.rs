use std::fmt;

use crate::verdict::Verdict;

/// An input address after syntax checking and typo correction.
///
/// `original` is exactly what the caller supplied; `local` and `domain`
/// describe the address used for every downstream lookup.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub original: String,
    pub local: String,
    /// Lower-cased and typo-corrected.
    pub domain: String,
    /// Set when the domain was rewritten from a known misspelling.
    pub corrected_from: Option<String>,
}

impl Address {
    /// `local@domain` after correction.
    pub fn corrected(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }

    pub fn was_corrected(&self) -> bool {
        self.corrected_from.is_some()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Result of running the classification chain on one input string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    /// Syntax check failed; nothing could be parsed.
    Malformed { original: String, reason: String },
    /// A heuristic produced a final verdict without any network activity.
    Settled {
        address: Address,
        verdict: Verdict,
        note: String,
    },
    /// The address needs MX resolution and probing.
    Proceed(Address),
}

impl Screening {
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Self::Malformed { .. } => Some(Verdict::Invalid),
            Self::Settled { verdict, .. } => Some(*verdict),
            Self::Proceed(_) => None,
        }
    }

    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::Malformed { .. } => None,
            Self::Settled { address, .. } | Self::Proceed(address) => Some(address),
        }
    }
}
