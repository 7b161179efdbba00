//! Bounded-concurrency batch driver.
//!
//! A [`Dispatcher`] owns the read-only classifier tables, the shared
//! [`MxCache`] and a [`CandidateProber`]. [`Dispatcher::run`] feeds every
//! input address through classify → policy → MX → probe → verdict on a
//! fixed-size rayon pool and streams records back to the calling thread,
//! which flushes them to a [`ResultSink`] in batches.

mod error;
mod sink;

pub use error::DispatchError;
pub use sink::{BatchSummary, Partition, ResultSink};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::classifier::{Classifier, Screening};
use crate::mx::{LookupMx, MxCache, MxError};
use crate::probe::{CandidateProber, ProbeReport, probe_exchangers};
use crate::verdict::{DomainPolicy, ResultRecord};

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Worker pool size; also the bound on concurrent network operations.
    pub workers: usize,
    /// Exchangers tried per address at most.
    pub max_candidates: usize,
    /// Records buffered before each sink flush.
    pub flush_every: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            workers: 50,
            max_candidates: 3,
            flush_every: 500,
        }
    }
}

pub struct Dispatcher<R, P> {
    classifier: Classifier,
    cache: MxCache<R>,
    prober: P,
    policies: HashMap<String, DomainPolicy>,
    options: DispatchOptions,
}

impl<R, P> Dispatcher<R, P>
where
    R: LookupMx,
    P: CandidateProber,
{
    pub fn new(
        classifier: Classifier,
        cache: MxCache<R>,
        prober: P,
        options: DispatchOptions,
    ) -> Self {
        Self {
            classifier,
            cache,
            prober,
            policies: HashMap::new(),
            options,
        }
    }

    /// Domains that skip MX resolution and probing entirely.
    pub fn with_policies<I, D>(mut self, policies: I) -> Self
    where
        I: IntoIterator<Item = (D, DomainPolicy)>,
        D: AsRef<str>,
    {
        for (domain, policy) in policies {
            let domain = domain.as_ref().trim().trim_end_matches('.');
            if !domain.is_empty() {
                self.policies.insert(domain.to_ascii_lowercase(), policy);
            }
        }
        self
    }

    pub fn cache(&self) -> &MxCache<R> {
        &self.cache
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Full pipeline for one address. Never fails: every problem becomes a
    /// verdict with a diagnostic note.
    pub fn verify_one(&self, raw: &str) -> ResultRecord {
        let address = match self.classifier.classify(raw) {
            Screening::Proceed(address) => address,
            Screening::Malformed { original, reason } => {
                return ResultRecord::malformed(&original, &reason);
            }
            Screening::Settled {
                address,
                verdict,
                note,
            } => return ResultRecord::settled(&address, verdict, note),
        };

        if let Some(policy) = self.policies.get(&address.domain) {
            return ResultRecord::from_policy(&address, *policy);
        }

        let exchangers = match self.cache.resolve(&address.domain) {
            Ok(list) => list,
            Err(err @ (MxError::EmptyDomain | MxError::IdnaConversion { .. })) => {
                return ResultRecord::malformed(&address.original, &err.to_string());
            }
            Err(err) => return ResultRecord::from_lookup_failure(&address, &err.to_string()),
        };

        let report = if exchangers.is_empty() {
            ProbeReport::exhausted()
        } else {
            probe_exchangers(
                &self.prober,
                &address,
                &exchangers,
                self.options.max_candidates,
            )
        };
        ResultRecord::from_probe(&address, report)
    }

    /// Resolves every distinct domain that will need probing, so the probe
    /// phase runs against a warm cache. Returns the number of domains whose
    /// answer is now cached.
    pub fn prewarm<I>(&self, addresses: I) -> Result<usize, DispatchError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut domains = HashSet::new();
        for raw in addresses {
            if let Screening::Proceed(address) = self.classifier.classify(raw.as_ref()) {
                if !self.policies.contains_key(&address.domain) {
                    domains.insert(address.domain);
                }
            }
        }
        let total = domains.len();
        let pool = self.build_pool()?;
        let cached = AtomicUsize::new(0);
        pool.install(|| {
            domains.into_par_iter().for_each(|domain| {
                if self.cache.resolve(&domain).is_ok() {
                    cached.fetch_add(1, Ordering::Relaxed);
                }
            });
        });
        let cached = cached.into_inner();
        info!(domains = total, cached, "MX cache prewarmed");
        Ok(cached)
    }

    /// Verifies every address, flushing to `sink` every `flush_every`
    /// records and once at the end.
    ///
    /// Exactly one record is produced per input item. Only a pool start
    /// failure or a sink error aborts the batch.
    pub fn run<I, S>(&self, addresses: I, sink: &mut S) -> Result<BatchSummary, DispatchError>
    where
        I: IntoIterator,
        I::IntoIter: Send,
        I::Item: AsRef<str> + Send,
        S: ResultSink + ?Sized,
    {
        let pool = self.build_pool()?;
        let flush_every = self.options.flush_every.max(1);
        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<ResultRecord>();
        let queue = addresses.into_iter();

        let mut summary = BatchSummary::default();
        let mut pending: Vec<ResultRecord> = Vec::with_capacity(flush_every);
        let mut failure = None;

        thread::scope(|scope| {
            let abort = &abort;
            scope.spawn(move || {
                pool.install(|| {
                    queue
                        .par_bridge()
                        .for_each_with(tx, |tx, raw| {
                            if abort.load(Ordering::Relaxed) {
                                return;
                            }
                            let record = self.verify_one(raw.as_ref());
                            debug!(address = %record.original, verdict = %record.verdict, "verified");
                            // receiver gone means the batch is aborting
                            let _ = tx.send(record);
                        });
                });
            });

            for record in rx {
                summary.record(&record);
                pending.push(record);
                if pending.len() >= flush_every {
                    if let Err(err) = sink.write_batch(&pending) {
                        failure = Some(DispatchError::sink(err));
                        abort.store(true, Ordering::Relaxed);
                        break;
                    }
                    pending.clear();
                    info!(done = summary.total(), "flushed partial results");
                }
            }
        });

        if let Some(err) = failure {
            return Err(err);
        }
        if !pending.is_empty() {
            sink.write_batch(&pending).map_err(DispatchError::sink)?;
        }
        sink.finish().map_err(DispatchError::sink)?;
        info!(
            total = summary.total(),
            mx_lookups = self.cache.lookups(),
            "batch complete"
        );
        Ok(summary)
    }

    fn build_pool(&self) -> Result<rayon::ThreadPool, DispatchError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|index| format!("probe-worker-{index}"))
            .build()
            .map_err(|source| DispatchError::PoolBuild { source })
    }
}
