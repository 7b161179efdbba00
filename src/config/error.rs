use std::path::PathBuf;

use thiserror::Error;

use crate::mx::MxError;
use crate::probe::ProbeError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[cfg(feature = "with-config")]
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "with-config")]
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid DNS server address '{value}'")]
    DnsServer { value: String },
    #[error("{key} must be at least 1")]
    Zero { key: &'static str },
    #[error("invalid policy for {domain}: {message}")]
    Policy { domain: String, message: String },
    #[error("cannot read block-list {path}: {source}")]
    Blocklist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Resolver(#[from] MxError),
    #[error(transparent)]
    Prober(#[from] ProbeError),
}
