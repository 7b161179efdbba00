use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::Error;
use super::resolver::{LookupMx, normalize_domain, order_records};

/// Ordered exchanger hostnames for one domain. Empty means "no exchanger".
pub type Exchangers = Arc<[String]>;

/// A settled slot. Timeouts are final for this run only, so they are kept
/// out of [`MxCache::snapshot`].
#[derive(Debug, Clone)]
struct Settled {
    exchangers: Exchangers,
    timed_out: bool,
}

impl Settled {
    fn answer(exchangers: Exchangers) -> Self {
        Self {
            exchangers,
            timed_out: false,
        }
    }
}

type Slot = Arc<OnceCell<Settled>>;

/// Process-wide MX cache with per-domain request coalescing.
///
/// The map lock is only held to find or create a domain's slot; the lookup
/// itself runs inside that slot's `OnceCell`, so concurrent requests for the
/// same uncached domain wait for a single resolution while unrelated domains
/// proceed in parallel. Transient failures leave the slot empty.
pub struct MxCache<R> {
    resolver: R,
    overrides: HashMap<String, Exchangers>,
    slots: Mutex<HashMap<String, Slot>>,
    lookups: AtomicUsize,
}

impl<R: LookupMx> MxCache<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            overrides: HashMap::new(),
            slots: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Static exchangers served without DNS, e.g. for providers whose
    /// published MX hosts are unsuitable for direct probing.
    pub fn with_overrides<I, D, H>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (D, Vec<H>)>,
        D: AsRef<str>,
        H: Into<String>,
    {
        for (domain, hosts) in overrides {
            let Ok(key) = normalize_domain(domain.as_ref()) else {
                continue;
            };
            let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
            let list = order_records(
                hosts
                    .into_iter()
                    .map(|host| super::MxRecord::new(0, host))
                    .collect(),
            );
            self.overrides.insert(key, list.into());
        }
        self
    }

    /// Resolves `domain`, waiting on an in-flight lookup for the same domain
    /// if there is one. Only transient failures are returned as `Err`.
    pub fn resolve(&self, domain: &str) -> Result<Exchangers, Error> {
        let key = normalize_domain(domain)?;
        if let Some(list) = self.overrides.get(&key) {
            return Ok(Arc::clone(list));
        }

        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.get_or_try_init(|| self.lookup(&key))
            .map(|settled| Arc::clone(&settled.exchangers))
    }

    fn lookup(&self, domain: &str) -> Result<Settled, Error> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        match self.resolver.lookup_mx(domain) {
            Ok(records) => {
                let list = order_records(records);
                debug!(domain, exchangers = ?list, "cached MX answer");
                Ok(Settled::answer(list.into()))
            }
            Err(err) if err.is_authoritative_negative() => {
                debug!(domain, reason = %err, "cached negative MX answer");
                Ok(Settled {
                    exchangers: Arc::from(Vec::<String>::new()),
                    timed_out: matches!(err, Error::Timeout { .. }),
                })
            }
            Err(err) => {
                warn!(domain, error = %err, "transient MX lookup failure, not cached");
                Err(err)
            }
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<R> MxCache<R> {
    /// Seeds entries (e.g. from a previous run). Existing entries win.
    pub fn preload<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut slots = self.slots.lock();
        let mut added = 0;
        for (domain, hosts) in entries {
            let Ok(key) = normalize_domain(&domain) else {
                continue;
            };
            let slot = slots.entry(key).or_default();
            if slot.get().is_none() {
                let list = order_records(
                    hosts
                        .into_iter()
                        .map(|host| super::MxRecord::new(0, host))
                        .collect(),
                );
                if slot.set(Settled::answer(list.into())).is_ok() {
                    added += 1;
                }
            }
        }
        added
    }

    pub fn is_cached(&self, domain: &str) -> bool {
        let Ok(key) = normalize_domain(domain) else {
            return false;
        };
        self.overrides.contains_key(&key)
            || self
                .slots
                .lock()
                .get(&key)
                .is_some_and(|slot| slot.get().is_some())
    }

    /// Settled entries sorted by domain. Overrides and timed-out lookups are
    /// not included, so a later run retries the latter.
    pub fn snapshot(&self) -> Vec<(String, Vec<String>)> {
        let slots = self.slots.lock();
        let mut entries: Vec<(String, Vec<String>)> = slots
            .iter()
            .filter_map(|(domain, slot)| {
                slot.get()
                    .filter(|settled| !settled.timed_out)
                    .map(|settled| (domain.clone(), settled.exchangers.to_vec()))
            })
            .collect();
        entries.sort();
        entries
    }

    /// Number of resolver calls issued so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}
