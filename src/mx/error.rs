use thiserror::Error;

#[derive(Debug, Error)]
pub enum MxError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("domain IDNA conversion failed")]
    IdnaConversion {
        #[source]
        source: idna::Errors,
    },
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: std::io::Error,
    },
    #[error("domain {domain} does not exist")]
    NoSuchDomain { domain: String },
    #[error("no MX records for {domain}")]
    NoRecords { domain: String },
    #[error("MX lookup for {domain} timed out")]
    Timeout { domain: String },
    #[error("MX lookup for {domain} failed: {source}")]
    Lookup {
        domain: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
    #[cfg(feature = "with-csv")]
    #[error("MX cache file error: {source}")]
    Persist {
        #[source]
        source: csv::Error,
    },
    #[cfg(feature = "with-csv")]
    #[error("MX cache file I/O error: {source}")]
    PersistIo {
        #[source]
        source: std::io::Error,
    },
}

impl MxError {
    pub(crate) fn idna(source: idna::Errors) -> Self {
        Self::IdnaConversion { source }
    }

    pub(crate) fn resolver_init(source: std::io::Error) -> Self {
        Self::ResolverInit { source }
    }

    pub(crate) fn lookup(domain: &str, source: trust_dns_resolver::error::ResolveError) -> Self {
        Self::Lookup {
            domain: domain.to_string(),
            source,
        }
    }

    /// NXDOMAIN, empty answer and timeout are final for the run and get cached
    /// as "no exchanger"; anything else may succeed on retry. Timeouts are
    /// not written to the cache file.
    pub fn is_authoritative_negative(&self) -> bool {
        matches!(
            self,
            Self::NoSuchDomain { .. } | Self::NoRecords { .. } | Self::Timeout { .. }
        )
    }
}
