#![forbid(unsafe_code)]
//! mailprobe_lib : vérification de délivrabilité en masse, sans envoyer de mail.
//!
//! Pipeline per address: [`classifier`] (syntax, typos, disposable domains,
//! role accounts) → [`mx`] (cached MX resolution) → [`probe`] (SMTP
//! `RCPT TO` with exchanger fallback) → [`verdict`]. The [`dispatch`] module
//! runs it over a batch on a bounded worker pool.

pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod mx;
pub mod probe;
pub mod verdict;

pub use classifier::{Address, Classifier, ClassifierTables, Screening};
pub use config::{Config, ConfigError};
pub use dispatch::{
    BatchSummary, DispatchError, DispatchOptions, Dispatcher, Partition, ResultSink,
};
pub use mx::{DnsResolver, Exchangers, LookupMx, MxCache, MxError, MxRecord, MxStatus, check_mx};
pub use probe::{
    AttemptOutcome, AttemptStage, CandidateProber, ProbeError, ProbeOptions, ProbeOutcome,
    ProbeReport, ResolveHost, ServerAttempt, SmtpEvent, SmtpProber, SmtpReply, probe_exchangers,
};
pub use verdict::{DomainPolicy, ResultRecord, Verdict};

#[cfg(feature = "with-config")]
pub use config::ConfigFile;
