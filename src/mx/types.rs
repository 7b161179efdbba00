#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxStatus {
    /// Exchanger hostnames, most preferred first.
    Exchangers(Vec<String>),
    NoExchanger,
}

impl MxStatus {
    pub fn from_list(exchangers: &[String]) -> Self {
        if exchangers.is_empty() {
            Self::NoExchanger
        } else {
            Self::Exchangers(exchangers.to_vec())
        }
    }

    pub fn exchangers(&self) -> &[String] {
        match self {
            Self::Exchangers(list) => list.as_slice(),
            Self::NoExchanger => &[],
        }
    }
}
