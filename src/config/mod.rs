//! Runtime configuration: defaults, optional TOML file, and builders for the
//! engine components.

mod error;
#[cfg(feature = "with-config")]
mod file;

pub use error::ConfigError;
#[cfg(feature = "with-config")]
pub use file::ConfigFile;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::classifier::{Classifier, ClassifierTables};
use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::mx::{DnsResolver, LookupMx, MxCache};
use crate::probe::{ProbeOptions, ResolveHost, SmtpProber};
use crate::verdict::DomainPolicy;

/// Everything needed to assemble a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Empty means the system resolver configuration.
    pub dns_servers: Vec<IpAddr>,
    pub dns_timeout: Duration,
    /// Persisted MX cache (`MX_Records.csv` layout).
    pub mx_cache: Option<PathBuf>,

    pub probe: ProbeOptions,
    pub dispatch: DispatchOptions,

    /// Newline-separated domains merged into the disposable set.
    pub blocklist: Option<PathBuf>,
    pub extra_disposable: Vec<String>,
    pub extra_business_keywords: Vec<String>,
    /// `(typo, canonical)` pairs added to the built-in typo map.
    pub extra_typos: Vec<(String, String)>,

    pub policies: Vec<(String, DomainPolicy)>,
    pub exchanger_overrides: Vec<(String, Vec<String>)>,

    pub loaded_config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_servers: vec![
                IpAddr::from([8, 8, 8, 8]),
                IpAddr::from([8, 8, 4, 4]),
            ],
            dns_timeout: Duration::from_secs(5),
            mx_cache: None,
            probe: ProbeOptions::default(),
            dispatch: DispatchOptions::default(),
            blocklist: None,
            extra_disposable: Vec::new(),
            extra_business_keywords: Vec::new(),
            extra_typos: Vec::new(),
            policies: vec![
                ("aol.com".to_string(), DomainPolicy::AlwaysValid),
                ("yahoo.com".to_string(), DomainPolicy::AlwaysValid),
            ],
            exchanger_overrides: vec![
                (
                    "outlook.com".to_string(),
                    vec!["outlook-com.olc.protection.outlook.com".to_string()],
                ),
                (
                    "hotmail.com".to_string(),
                    vec!["hotmail-com.olc.protection.outlook.com".to_string()],
                ),
            ],
            loaded_config_path: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with the TOML file at `path`.
    #[cfg(feature = "with-config")]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = ConfigFile::load(path)?;
        let mut config = Self::default();
        config.apply_file(file)?;
        config.loaded_config_path = Some(path.to_path_buf());
        info!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Overlays every key present in `file`. Tables (policies, typos,
    /// exchanger overrides) extend the defaults; a domain listed again wins.
    #[cfg(feature = "with-config")]
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        let ConfigFile {
            dns,
            smtp,
            dispatch,
            classifier,
            policy,
        } = file;

        if let Some(servers) = dns.servers {
            self.dns_servers = parse_dns_servers(&servers)?;
        }
        if let Some(secs) = dns.timeout_secs {
            self.dns_timeout = Duration::from_secs(secs);
        }
        if dns.mx_cache.is_some() {
            self.mx_cache = dns.mx_cache;
        }

        if let Some(port) = smtp.port {
            self.probe.port = port;
        }
        if let Some(sender) = smtp.sender {
            self.probe.envelope_sender = sender;
        }
        if smtp.helo.is_some() {
            self.probe.helo_domain = smtp.helo;
        }
        if let Some(secs) = smtp.timeout_secs {
            self.probe.timeout = Duration::from_secs(secs);
        }
        if let Some(cap) = smtp.max_candidates {
            self.dispatch.max_candidates = cap;
        }
        if let Some(starttls) = smtp.starttls {
            self.probe.starttls = starttls;
        }
        if let Some(accept) = smtp.accept_invalid_certs {
            self.probe.accept_invalid_certs = accept;
        }

        if let Some(workers) = dispatch.workers {
            self.dispatch.workers = workers;
        }
        if let Some(flush_every) = dispatch.flush_every {
            self.dispatch.flush_every = flush_every;
        }

        if classifier.blocklist.is_some() {
            self.blocklist = classifier.blocklist;
        }
        self.extra_disposable
            .extend(classifier.disposable.unwrap_or_default());
        self.extra_business_keywords
            .extend(classifier.business_keywords.unwrap_or_default());
        self.extra_typos
            .extend(classifier.typos.unwrap_or_default());

        for (domain, value) in policy.domains.unwrap_or_default() {
            let parsed = value.parse::<DomainPolicy>().map_err(|message| ConfigError::Policy {
                domain: domain.clone(),
                message,
            })?;
            self.set_policy(&domain, parsed);
        }
        for (domain, hosts) in policy.exchangers.unwrap_or_default() {
            let key = domain.trim().to_ascii_lowercase();
            self.exchanger_overrides.retain(|(d, _)| *d != key);
            self.exchanger_overrides.push((key, hosts));
        }
        self.validate()
    }

    /// Rejects counts that would leave the engine with nothing to do.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("workers", self.dispatch.workers),
            ("max_candidates", self.dispatch.max_candidates),
            ("flush_every", self.dispatch.flush_every),
        ];
        match counts.into_iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ConfigError::Zero { key }),
            None => Ok(()),
        }
    }

    pub fn set_policy(&mut self, domain: &str, policy: DomainPolicy) {
        let key = domain.trim().to_ascii_lowercase();
        self.policies.retain(|(d, _)| *d != key);
        self.policies.push((key, policy));
    }

    /// Built-in tables plus configured additions and the block-list file.
    pub fn build_classifier(&self) -> Result<Classifier, ConfigError> {
        let mut tables = ClassifierTables::default();
        tables.add_disposable(&self.extra_disposable);
        tables.add_business_keywords(&self.extra_business_keywords);
        for (typo, canonical) in &self.extra_typos {
            tables.add_typos(canonical, [typo]);
        }
        if let Some(path) = &self.blocklist {
            let file = std::fs::File::open(path).map_err(|source| ConfigError::Blocklist {
                path: path.clone(),
                source,
            })?;
            let added = tables
                .load_blocklist(std::io::BufReader::new(file))
                .map_err(|source| ConfigError::Blocklist {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path.display(), added, "loaded disposable block-list");
        }
        Ok(Classifier::new(tables))
    }

    pub fn build_resolver(&self) -> Result<DnsResolver, ConfigError> {
        Ok(DnsResolver::with_servers(&self.dns_servers, self.dns_timeout)?)
    }

    pub fn build_cache<R: LookupMx>(&self, resolver: R) -> MxCache<R> {
        MxCache::new(resolver).with_overrides(self.exchanger_overrides.iter().cloned())
    }

    /// `hosts` resolves exchanger names to addresses.
    pub fn build_prober(&self, hosts: Arc<dyn ResolveHost>) -> Result<SmtpProber, ConfigError> {
        Ok(SmtpProber::new(self.probe.clone(), hosts)?)
    }

    /// Live engine: real DNS and SMTP. One resolver serves both MX and
    /// exchanger address lookups.
    pub fn build_dispatcher(
        &self,
    ) -> Result<Dispatcher<Arc<DnsResolver>, SmtpProber>, ConfigError> {
        self.validate()?;
        let resolver = Arc::new(self.build_resolver()?);
        let cache = self.build_cache(Arc::clone(&resolver));
        Ok(Dispatcher::new(
            self.build_classifier()?,
            cache,
            self.build_prober(resolver)?,
            self.dispatch.clone(),
        )
        .with_policies(self.policies.iter().map(|(d, p)| (d.as_str(), *p))))
    }
}

/// Parses resolver addresses; a `host:port` suffix is not accepted.
pub fn parse_dns_servers<S: AsRef<str>>(values: &[S]) -> Result<Vec<IpAddr>, ConfigError> {
    values
        .iter()
        .map(|value| {
            let value = value.as_ref().trim();
            value.parse::<IpAddr>().map_err(|_| ConfigError::DnsServer {
                value: value.to_string(),
            })
        })
        .collect()
}
