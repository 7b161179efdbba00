//! On-disk TOML layout. Every key is optional; unknown keys are rejected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) dns: DnsSection,
    #[serde(default)]
    pub(crate) smtp: SmtpSection,
    #[serde(default)]
    pub(crate) dispatch: DispatchSection,
    #[serde(default)]
    pub(crate) classifier: ClassifierSection,
    #[serde(default)]
    pub(crate) policy: PolicySection,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsSection {
    pub(crate) servers: Option<Vec<String>>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) mx_cache: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpSection {
    pub(crate) port: Option<u16>,
    pub(crate) sender: Option<String>,
    pub(crate) helo: Option<String>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) max_candidates: Option<usize>,
    pub(crate) starttls: Option<bool>,
    pub(crate) accept_invalid_certs: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DispatchSection {
    pub(crate) workers: Option<usize>,
    pub(crate) flush_every: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct ClassifierSection {
    pub(crate) blocklist: Option<PathBuf>,
    pub(crate) disposable: Option<Vec<String>>,
    pub(crate) business_keywords: Option<Vec<String>>,
    /// typo → canonical domain
    pub(crate) typos: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct PolicySection {
    /// domain → `valid` | `invalid`
    pub(crate) domains: Option<BTreeMap<String, String>>,
    /// domain → exchangers used instead of its MX records
    pub(crate) exchangers: Option<BTreeMap<String, Vec<String>>>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
