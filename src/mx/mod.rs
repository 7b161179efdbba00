//! MX resolution with a shared, coalescing per-domain cache.
//!
//! [`MxCache::resolve`] is what the dispatcher calls for every address; it
//! issues at most one DNS query per domain per run. [`check_mx`] is a one-off
//! lookup through the system resolver.

mod cache;
mod error;
#[cfg(feature = "with-csv")]
mod persist;
mod resolver;
mod types;

pub use cache::{Exchangers, MxCache};
pub use error::MxError;
pub use error::MxError as Error;
#[cfg(feature = "with-csv")]
pub use persist::{read_entries, write_entries};
pub use resolver::{DnsResolver, LookupMx, check_mx};
pub use types::{MxRecord, MxStatus};
