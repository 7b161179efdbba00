use std::borrow::Cow;
use std::time::Duration;

/// Controls how the SMTP probe interrogates exchangers.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub port: u16,
    /// Name sent with `EHLO`/`HELO`. Defaults to the sender's domain.
    pub helo_domain: Option<String>,
    /// Envelope sender used in `MAIL FROM`.
    pub envelope_sender: String,
    /// Budget for one exchanger, connect included.
    pub timeout: Duration,
    /// Upgrade with `STARTTLS` when the server offers it.
    pub starttls: bool,
    pub accept_invalid_certs: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            port: 25,
            helo_domain: None,
            envelope_sender: "postmaster@localhost".to_string(),
            timeout: Duration::from_secs(25),
            starttls: true,
            accept_invalid_certs: true,
        }
    }
}

impl ProbeOptions {
    /// Returns the hostname used in `EHLO`. Falls back to the domain of the
    /// envelope sender, then to `localhost`.
    pub fn helo_name(&self) -> Cow<'_, str> {
        if let Some(helo) = self.helo_domain.as_deref().filter(|h| !h.trim().is_empty()) {
            return Cow::Borrowed(helo.trim());
        }
        match self.envelope_sender.rsplit_once('@') {
            Some((_, domain)) if !domain.is_empty() => Cow::Borrowed(domain),
            _ => Cow::Borrowed("localhost"),
        }
    }

    pub fn mail_from_command(&self) -> String {
        format!("MAIL FROM:<{}>", self.envelope_sender.trim())
    }
}
