use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::mx::{DnsResolver, MxError};

use super::error::ProbeError;

/// Turns an exchanger hostname into addresses within `budget`.
pub trait ResolveHost: Send + Sync {
    fn resolve_host(&self, host: &str, budget: Duration) -> Result<Vec<IpAddr>, ProbeError>;
}

impl<H: ResolveHost + ?Sized> ResolveHost for Arc<H> {
    fn resolve_host(&self, host: &str, budget: Duration) -> Result<Vec<IpAddr>, ProbeError> {
        (**self).resolve_host(host, budget)
    }
}

impl ResolveHost for DnsResolver {
    fn resolve_host(&self, host: &str, budget: Duration) -> Result<Vec<IpAddr>, ProbeError> {
        self.lookup_ip(host, budget).map_err(|err| match err {
            MxError::Timeout { .. } => ProbeError::Timeout,
            source => ProbeError::Resolve {
                host: host.to_string(),
                source,
            },
        })
    }
}
