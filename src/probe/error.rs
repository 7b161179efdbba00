use std::io;

use thiserror::Error;

use crate::mx::MxError;

/// Failures while talking to a single exchanger. Every variant makes that
/// candidate inconclusive; none of them aborts the address.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no socket address for {host}")]
    NoAddress { host: String },
    #[error("address resolution for {host} failed: {source}")]
    Resolve {
        host: String,
        #[source]
        source: MxError,
    },
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out")]
    Timeout,
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("TLS setup failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProbeError {
    /// Maps socket errors, turning read/write deadline expiry into [`ProbeError::Timeout`].
    pub(crate) fn io(source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io { source },
        }
    }

    pub(crate) fn connect(host: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Connect {
                host: host.to_string(),
                source,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
