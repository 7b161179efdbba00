//! Final categories and the per-address result record.

use std::fmt;
use std::str::FromStr;

use crate::classifier::{Address, Screening};
use crate::probe::{ProbeOutcome, ProbeReport, SmtpEvent, SmtpReply};

/// Category assigned to every input address.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verdict {
    Valid,
    Invalid,
    Business,
    SpamTrapOrDisposable,
    Blocked,
}

impl Verdict {
    pub const ALL: [Verdict; 5] = [
        Verdict::Valid,
        Verdict::Invalid,
        Verdict::Business,
        Verdict::SpamTrapOrDisposable,
        Verdict::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Business => "business",
            Self::SpamTrapOrDisposable => "spam_trap",
            Self::Blocked => "blocked",
        }
    }

    /// Protocol evidence → verdict. Both inconclusive shapes collapse to `Blocked`.
    pub fn from_outcome(outcome: &ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Accepted => Self::Valid,
            ProbeOutcome::Rejected => Self::Invalid,
            ProbeOutcome::Indeterminate | ProbeOutcome::Exhausted => Self::Blocked,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed verdict configured for a whole domain; the probe is skipped.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainPolicy {
    AlwaysValid,
    AlwaysInvalid,
}

impl DomainPolicy {
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::AlwaysValid => Verdict::Valid,
            Self::AlwaysInvalid => Verdict::Invalid,
        }
    }
}

impl FromStr for DomainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" | "always_valid" | "accept" => Ok(Self::AlwaysValid),
            "invalid" | "always_invalid" | "reject" => Ok(Self::AlwaysInvalid),
            other => Err(format!("unknown domain policy '{other}', use: valid|invalid")),
        }
    }
}

/// One record per input address, emitted exactly once.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub original: String,
    /// Address used for lookups; equals the trimmed original unless a typo was fixed.
    pub corrected: Option<String>,
    pub exchanger: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub outcome: Option<ProbeOutcome>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub mail_from_reply: Option<SmtpReply>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub rcpt_reply: Option<SmtpReply>,
    #[cfg_attr(feature = "with-serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub transcript: Vec<SmtpEvent>,
    pub verdict: Verdict,
    pub note: String,
}

impl ResultRecord {
    fn bare(original: &str, corrected: Option<String>, verdict: Verdict, note: String) -> Self {
        Self {
            original: original.to_string(),
            corrected,
            exchanger: None,
            outcome: None,
            mail_from_reply: None,
            rcpt_reply: None,
            transcript: Vec::new(),
            verdict,
            note,
        }
    }

    /// Record for an address settled by the classifier alone.
    ///
    /// Returns `None` when the screening still needs the network.
    pub fn from_screening(screening: &Screening) -> Option<Self> {
        match screening {
            Screening::Malformed { original, reason } => Some(Self::malformed(original, reason)),
            Screening::Settled {
                address,
                verdict,
                note,
            } => Some(Self::settled(address, *verdict, note.clone())),
            Screening::Proceed(_) => None,
        }
    }

    pub fn malformed(original: &str, reason: &str) -> Self {
        Self::bare(
            original,
            None,
            Verdict::Invalid,
            format!("invalid syntax: {reason}"),
        )
    }

    pub fn settled(address: &Address, verdict: Verdict, note: String) -> Self {
        Self::bare(&address.original, Some(address.corrected()), verdict, note)
    }

    pub fn from_policy(address: &Address, policy: DomainPolicy) -> Self {
        Self::bare(
            &address.original,
            Some(address.corrected()),
            policy.verdict(),
            format!("domain policy for {} ({})", address.domain, policy.verdict()),
        )
    }

    /// MX lookup failed with a transient error; nothing was probed.
    pub fn from_lookup_failure(address: &Address, message: &str) -> Self {
        let mut record = Self::bare(
            &address.original,
            Some(address.corrected()),
            Verdict::Blocked,
            format!("MX lookup failed (transient): {message}"),
        );
        record.outcome = Some(ProbeOutcome::Indeterminate);
        record
    }

    pub fn from_probe(address: &Address, report: ProbeReport) -> Self {
        let verdict = Verdict::from_outcome(&report.outcome);
        let note = report.note();
        let mut record = Self::bare(
            &address.original,
            Some(address.corrected()),
            verdict,
            note,
        );
        record.outcome = Some(report.outcome.clone());
        if let Some(attempt) = report.into_deciding_attempt() {
            record.mail_from_reply = attempt.mail_from_reply().cloned();
            record.rcpt_reply = attempt.rcpt_reply().cloned();
            record.exchanger = Some(attempt.exchange);
            record.transcript = attempt.events;
        }
        record
    }
}
