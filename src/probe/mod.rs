//! SMTP recipient probing with multi-exchanger fallback.
//!
//! [`probe_exchangers`] walks an ordered candidate list through the
//! [`ProbeState`] machine, asking a [`CandidateProber`] about one exchanger at a
//! time. [`SmtpProber`] is the live implementation; tests substitute their own.

mod error;
mod hosts;
mod machine;
mod options;
mod session;
mod smtp;
mod types;

pub use error::ProbeError;
pub use hosts::ResolveHost;
pub use machine::{ProbeState, probe_exchangers};
pub use options::ProbeOptions;
pub use smtp::SmtpProber;
pub use types::{
    AttemptOutcome, AttemptStage, ProbeOutcome, ProbeReport, ServerAttempt, SmtpEvent, SmtpReply,
};

use crate::classifier::Address;

/// Interrogates a single exchanger about `target`.
///
/// Implementations must not fail: every problem is folded into an
/// inconclusive [`AttemptOutcome`].
pub trait CandidateProber: Send + Sync {
    fn attempt(&self, exchanger: &str, target: &Address) -> ServerAttempt;
}

impl<P: CandidateProber + ?Sized> CandidateProber for &P {
    fn attempt(&self, exchanger: &str, target: &Address) -> ServerAttempt {
        (**self).attempt(exchanger, target)
    }
}

impl<P: CandidateProber + ?Sized> CandidateProber for std::sync::Arc<P> {
    fn attempt(&self, exchanger: &str, target: &Address) -> ServerAttempt {
        (**self).attempt(exchanger, target)
    }
}
