use std::net::IpAddr;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;

use super::{Error, MxRecord, MxStatus};

/// Source of raw MX answers.
///
/// Authoritative negatives are reported as [`Error::NoSuchDomain`],
/// [`Error::NoRecords`] or [`Error::Timeout`]; other errors are transient.
pub trait LookupMx: Send + Sync {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, Error>;
}

impl<L: LookupMx + ?Sized> LookupMx for &L {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, Error> {
        (**self).lookup_mx(domain)
    }
}

impl<L: LookupMx + ?Sized> LookupMx for std::sync::Arc<L> {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, Error> {
        (**self).lookup_mx(domain)
    }
}

/// Blocking facade over the tokio-based resolver.
///
/// Lookups from many worker threads run concurrently on a small private
/// runtime; callers simply block on the answer.
pub struct DnsResolver {
    runtime: Runtime,
    resolver: TokioAsyncResolver,
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver").finish_non_exhaustive()
    }
}

impl DnsResolver {
    /// Resolver configured from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> Result<Self, Error> {
        let runtime = build_runtime()?;
        let resolver = {
            let _guard = runtime.enter();
            TokioAsyncResolver::tokio_from_system_conf().map_err(|err| {
                Error::resolver_init(std::io::Error::other(err.to_string()))
            })?
        };
        Ok(Self { runtime, resolver })
    }

    /// Resolver querying `servers` on port 53 (UDP, TCP fallback).
    pub fn with_servers(servers: &[IpAddr], timeout: Duration) -> Result<Self, Error> {
        if servers.is_empty() {
            return Self::from_system_conf();
        }
        let runtime = build_runtime()?;
        let config = ResolverConfig::from_parts(
            None,
            Vec::new(),
            NameServerConfigGroup::from_ips_clear(servers, 53, true),
        );
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        let resolver = {
            let _guard = runtime.enter();
            TokioAsyncResolver::tokio(config, opts)
        };
        Ok(Self { runtime, resolver })
    }
}

impl DnsResolver {
    /// A and AAAA addresses of `host`. `budget` caps the whole lookup,
    /// retries included.
    pub fn lookup_ip(&self, host: &str, budget: Duration) -> Result<Vec<IpAddr>, Error> {
        let fqdn = format!("{}.", host.trim_end_matches('.'));
        let answer = self.runtime.block_on(async {
            tokio::time::timeout(budget, self.resolver.lookup_ip(fqdn.as_str())).await
        });
        let lookup = match answer {
            Ok(result) => result.map_err(|err| classify_error(host, err))?,
            Err(_) => {
                return Err(Error::Timeout {
                    domain: host.to_string(),
                });
            }
        };
        let addrs: Vec<IpAddr> = lookup.iter().collect();
        debug!(host, count = addrs.len(), "address answer");
        Ok(addrs)
    }
}

fn build_runtime() -> Result<Runtime, Error> {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("mx-resolver")
        .enable_all()
        .build()
        .map_err(Error::resolver_init)
}

impl LookupMx for DnsResolver {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, Error> {
        // trailing dot: never expand through resolv.conf search domains
        let fqdn = format!("{}.", domain.trim_end_matches('.'));
        let lookup = self
            .runtime
            .block_on(self.resolver.mx_lookup(fqdn.as_str()))
            .map_err(|err| classify_error(domain, err))?;
        let mut records = Vec::new();
        for mx in lookup.iter() {
            records.push(MxRecord::new(mx.preference(), mx.exchange().to_utf8()));
        }
        debug!(domain, count = records.len(), "MX answer");
        Ok(records)
    }
}

fn classify_error(domain: &str, err: ResolveError) -> Error {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            Error::NoSuchDomain {
                domain: domain.to_string(),
            }
        }
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NoError =>
        {
            Error::NoRecords {
                domain: domain.to_string(),
            }
        }
        ResolveErrorKind::Timeout => Error::Timeout {
            domain: domain.to_string(),
        },
        _ => Error::lookup(domain, err),
    }
}

/// Lookup MX records for `domain` using the system resolver.
///
/// Convenience for one-off checks; batch work goes through [`MxCache`](super::MxCache).
pub fn check_mx(domain: &str) -> Result<MxStatus, Error> {
    let ascii = normalize_domain(domain)?;
    let resolver = DnsResolver::from_system_conf()?;
    resolve_with(&resolver, &ascii)
}

pub(crate) fn resolve_with<R>(resolver: &R, ascii_domain: &str) -> Result<MxStatus, Error>
where
    R: LookupMx + ?Sized,
{
    match resolver.lookup_mx(ascii_domain) {
        Ok(records) => Ok(MxStatus::from_list(&order_records(records))),
        Err(err) if err.is_authoritative_negative() => Ok(MxStatus::NoExchanger),
        Err(err) => Err(err),
    }
}

/// Orders by ascending preference (stable, so ties keep answer order),
/// normalizes names, drops duplicates and null MX targets.
pub(crate) fn order_records(mut records: Vec<MxRecord>) -> Vec<String> {
    records.sort_by_key(|record| record.preference);
    let mut out: Vec<String> = Vec::with_capacity(records.len());
    for record in records {
        let exchange = normalize_exchange(record.exchange);
        if exchange.is_empty() || out.contains(&exchange) {
            continue;
        }
        out.push(exchange);
    }
    out
}

pub(crate) fn normalize_domain(domain: &str) -> Result<String, Error> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(Error::EmptyDomain);
    }
    idna::domain_to_ascii(trimmed).map_err(Error::idna)
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim().trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}
