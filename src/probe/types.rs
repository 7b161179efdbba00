use std::fmt;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    Resolve,
    Connect,
    Greeting,
    Ehlo,
    Helo,
    StartTls,
    MailFrom,
    RcptTo,
    Quit,
}

/// A raw SMTP reply, preserving the numeric status code and message text.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl SmtpReply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Whether an `EHLO` reply advertises `cap` as one of its keywords.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.message.lines().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(cap))
        })
    }

    /// RFC 3463 enhanced status code (`class.subject.detail`) at the start of
    /// the first line, if present.
    pub fn enhanced_status(&self) -> Option<(u8, u16, u16)> {
        let token = self.message.split_whitespace().next()?;
        let mut parts = token.split('.');
        let class = parts.next()?.parse::<u8>().ok()?;
        let subject = parts.next()?.parse::<u16>().ok()?;
        let detail = parts.next()?.parse::<u16>().ok()?;
        if parts.next().is_some() || !matches!(class, 2 | 4 | 5) {
            return None;
        }
        Some((class, subject, detail))
    }

    /// `5.7.x`: the refusal is about policy (reputation, blocklists), not the mailbox.
    pub fn is_policy_block(&self) -> bool {
        matches!(self.enhanced_status(), Some((5, 7, _)))
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message.lines().next() {
            Some(first) if !first.is_empty() => write!(f, "{} {first}", self.code),
            _ => write!(f, "{}", self.code),
        }
    }
}

/// A recorded SMTP transcript event used for diagnostics.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpEvent {
    Sent {
        stage: AttemptStage,
        command: String,
    },
    Received {
        stage: AttemptStage,
        reply: SmtpReply,
    },
    Error {
        stage: AttemptStage,
        message: String,
    },
}

/// Result of interrogating a single exchanger.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted { reply: SmtpReply },
    Rejected { reply: SmtpReply },
    /// Temporary failure, policy block, unreachable host, timeout, TLS or
    /// protocol trouble. Only this candidate is affected.
    Inconclusive {
        reason: String,
        reply: Option<SmtpReply>,
    },
}

impl AttemptOutcome {
    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self::Inconclusive {
            reason: reason.into(),
            reply: None,
        }
    }

    pub fn is_conclusive(&self) -> bool {
        matches!(self, Self::Accepted { .. } | Self::Rejected { .. })
    }

    pub fn as_reply(&self) -> Option<&SmtpReply> {
        match self {
            Self::Accepted { reply } | Self::Rejected { reply } => Some(reply),
            Self::Inconclusive { reply, .. } => reply.as_ref(),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted { reply } => write!(f, "accepted ({reply})"),
            Self::Rejected { reply } => write!(f, "rejected ({reply})"),
            Self::Inconclusive { reason, .. } => f.write_str(reason),
        }
    }
}

/// Detailed report for a single exchanger interrogation.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAttempt {
    pub exchange: String,
    pub address: Option<String>,
    pub events: Vec<SmtpEvent>,
    pub outcome: AttemptOutcome,
}

impl ServerAttempt {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            address: None,
            events: Vec::new(),
            outcome: AttemptOutcome::inconclusive("verification not attempted"),
        }
    }

    pub fn mail_from_reply(&self) -> Option<&SmtpReply> {
        self.last_reply(AttemptStage::MailFrom)
    }

    pub fn rcpt_reply(&self) -> Option<&SmtpReply> {
        self.last_reply(AttemptStage::RcptTo)
    }

    fn last_reply(&self, wanted: AttemptStage) -> Option<&SmtpReply> {
        self.events.iter().rev().find_map(|event| match event {
            SmtpEvent::Received { stage, reply } if *stage == wanted => Some(reply),
            _ => None,
        })
    }
}

/// Outcome of probing a whole candidate list for one address.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
    /// An exchanger affirmed the recipient.
    Accepted,
    /// An exchanger permanently denied the recipient.
    Rejected,
    /// Every candidate tried was inconclusive.
    Indeterminate,
    /// No exchanger to try.
    Exhausted,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Indeterminate => "indeterminate",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Aggregated result of [`probe_exchangers`](super::probe_exchangers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    /// One entry per exchanger actually contacted, in order.
    pub attempts: Vec<ServerAttempt>,
}

impl ProbeReport {
    pub fn exhausted() -> Self {
        Self {
            outcome: ProbeOutcome::Exhausted,
            attempts: Vec::new(),
        }
    }

    /// The attempt the outcome is based on: the conclusive one, or the last
    /// inconclusive one.
    pub fn deciding_attempt(&self) -> Option<&ServerAttempt> {
        self.attempts.last()
    }

    pub fn into_deciding_attempt(self) -> Option<ServerAttempt> {
        self.attempts.into_iter().last()
    }

    /// Human-readable diagnostic for the result record.
    pub fn note(&self) -> String {
        let last = self.deciding_attempt();
        match (self.outcome, last) {
            (ProbeOutcome::Exhausted, _) | (_, None) => "no mail exchanger for domain".to_string(),
            (ProbeOutcome::Accepted, Some(attempt)) => {
                format!("recipient accepted by {}", attempt.exchange)
            }
            (ProbeOutcome::Rejected, Some(attempt)) => match attempt.outcome.as_reply() {
                Some(reply) => format!("recipient rejected by {}: {reply}", attempt.exchange),
                None => format!("recipient rejected by {}", attempt.exchange),
            },
            (ProbeOutcome::Indeterminate, Some(attempt)) if self.attempts.len() == 1 => format!(
                "inconclusive after the only exchanger tried ({}): {}",
                attempt.exchange, attempt.outcome
            ),
            (ProbeOutcome::Indeterminate, Some(attempt)) => format!(
                "inconclusive after all {} exchangers; last ({}): {}",
                self.attempts.len(),
                attempt.exchange,
                attempt.outcome
            ),
        }
    }
}
