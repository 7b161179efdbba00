use tracing::debug;

use crate::classifier::Address;

use super::CandidateProber;
use super::types::{AttemptOutcome, ProbeOutcome, ProbeReport};

/// Position of the probe in its candidate list.
///
/// `Trying(i)` is the only non-terminal state. A conclusive answer from any
/// candidate ends the walk; an inconclusive one moves to the next candidate
/// or to `Exhausted` when none is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Trying(usize),
    Accepted(usize),
    Rejected(usize),
    Exhausted,
}

impl ProbeState {
    pub fn start(candidates: usize) -> Self {
        if candidates == 0 {
            Self::Exhausted
        } else {
            Self::Trying(0)
        }
    }

    pub fn advance(self, outcome: &AttemptOutcome, candidates: usize) -> Self {
        match (self, outcome) {
            (Self::Trying(i), AttemptOutcome::Accepted { .. }) => Self::Accepted(i),
            (Self::Trying(i), AttemptOutcome::Rejected { .. }) => Self::Rejected(i),
            (Self::Trying(i), AttemptOutcome::Inconclusive { .. }) if i + 1 < candidates => {
                Self::Trying(i + 1)
            }
            (Self::Trying(_), AttemptOutcome::Inconclusive { .. }) => Self::Exhausted,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Trying(_))
    }
}

/// Walks `exchangers` (capped at `max_candidates`) until one answer is conclusive.
pub fn probe_exchangers<P>(
    prober: &P,
    target: &Address,
    exchangers: &[String],
    max_candidates: usize,
) -> ProbeReport
where
    P: CandidateProber + ?Sized,
{
    let candidates = &exchangers[..exchangers.len().min(max_candidates)];
    let mut attempts = Vec::with_capacity(candidates.len());
    let mut state = ProbeState::start(candidates.len());

    while let ProbeState::Trying(index) = state {
        let attempt = prober.attempt(&candidates[index], target);
        state = state.advance(&attempt.outcome, candidates.len());
        debug!(address = %target, exchanger = %attempt.exchange, ?state, "probe step");
        attempts.push(attempt);
    }

    let outcome = match state {
        ProbeState::Accepted(_) => ProbeOutcome::Accepted,
        ProbeState::Rejected(_) => ProbeOutcome::Rejected,
        ProbeState::Exhausted if attempts.is_empty() => ProbeOutcome::Exhausted,
        ProbeState::Exhausted | ProbeState::Trying(_) => ProbeOutcome::Indeterminate,
    };
    ProbeReport { outcome, attempts }
}
