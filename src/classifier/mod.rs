//! Offline screening of addresses: syntax, typo correction, disposable
//! domains and role accounts.
//!
//! Nothing here touches the network. The order of the checks matters: a
//! syntax failure hides every other verdict, a disposable domain wins over a
//! role-account local part.

mod syntax;
mod tables;
mod types;

pub use tables::{BUSINESS_KEYWORDS, ClassifierTables, DISPOSABLE_DOMAINS, DOMAIN_TYPOS};
pub use types::{Address, Screening};

use tracing::{debug, info};

use crate::verdict::Verdict;

/// Runs the classification chain against immutable [`ClassifierTables`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    tables: ClassifierTables,
}

impl Classifier {
    pub fn new(tables: ClassifierTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ClassifierTables {
        &self.tables
    }

    pub fn classify(&self, raw: &str) -> Screening {
        let input = raw.trim();
        let (local, domain) = match syntax::split_address(input) {
            Ok(parts) => parts,
            Err(reason) => {
                debug!(address = raw, %reason, "syntax check failed");
                return Screening::Malformed {
                    original: raw.to_string(),
                    reason,
                };
            }
        };

        let address = self.correct(raw, local, domain);

        if self.is_disposable(&address.domain) {
            return Screening::Settled {
                note: format!("disposable or spam-trap domain {}", address.domain),
                address,
                verdict: Verdict::SpamTrapOrDisposable,
            };
        }

        if let Some(keyword) = self.business_keyword(&address.local) {
            return Screening::Settled {
                note: format!("role account (matched '{keyword}')"),
                address,
                verdict: Verdict::Business,
            };
        }

        Screening::Proceed(address)
    }

    fn correct(&self, raw: &str, local: &str, domain: &str) -> Address {
        let lowered = domain.to_ascii_lowercase();
        match self.tables.typos.get(&lowered) {
            Some(canonical) => {
                info!(address = raw, corrected = %canonical, "corrected domain typo");
                Address {
                    original: raw.to_string(),
                    local: local.to_string(),
                    domain: canonical.clone(),
                    corrected_from: Some(lowered),
                }
            }
            None => Address {
                original: raw.to_string(),
                local: local.to_string(),
                domain: lowered,
                corrected_from: None,
            },
        }
    }

    fn is_disposable(&self, domain: &str) -> bool {
        self.tables.disposable.contains(domain)
    }

    fn business_keyword(&self, local: &str) -> Option<&str> {
        let local = local.to_ascii_lowercase();
        self.tables
            .business_keywords
            .iter()
            .find(|keyword| local.contains(keyword.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> Classifier {
        Classifier::default()
    }

    #[test]
    fn malformed_inputs_are_invalid() {
        for raw in ["not-an-email", "a@b", "", "@example.com"] {
            let screening = classifier().classify(raw);
            assert!(
                matches!(screening, Screening::Malformed { .. }),
                "{raw:?} should be malformed, got {screening:?}"
            );
            assert_eq!(screening.verdict(), Some(Verdict::Invalid));
        }
    }

    #[test]
    fn typo_is_corrected_but_original_kept() {
        let screening = classifier().classify("user@gmial.com");
        let Screening::Proceed(address) = screening else {
            panic!("expected proceed, got {screening:?}");
        };
        assert_eq!(address.original, "user@gmial.com");
        assert_eq!(address.corrected(), "user@gmail.com");
        assert_eq!(address.corrected_from.as_deref(), Some("gmial.com"));
    }

    #[test]
    fn domain_is_lowercased() {
        let screening = classifier().classify("Alice@Example.COM");
        let address = screening.address().expect("parsed");
        assert_eq!(address.domain, "example.com");
        assert_eq!(address.local, "Alice");
        assert!(!address.was_corrected());
    }

    #[test]
    fn disposable_wins_over_business() {
        let screening = classifier().classify("support@mailinator.com");
        assert_eq!(screening.verdict(), Some(Verdict::SpamTrapOrDisposable));
    }

    #[test]
    fn typo_correction_applies_before_disposable_check() {
        let mut tables = ClassifierTables::empty();
        tables.add_typos("yopmail.com", ["yopmial.com"]);
        tables.add_disposable(["yopmail.com"]);
        let screening = Classifier::new(tables).classify("bob@yopmial.com");
        assert_eq!(screening.verdict(), Some(Verdict::SpamTrapOrDisposable));
    }

    #[test]
    fn role_account_is_business() {
        let screening = classifier().classify("support@acme.com");
        assert_eq!(screening.verdict(), Some(Verdict::Business));
        let Screening::Settled { note, .. } = screening else {
            panic!("expected settled");
        };
        insta::assert_snapshot!(note, @"role account (matched 'support')");
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let screening = classifier().classify("Global.SALES.eu@acme.com");
        assert_eq!(screening.verdict(), Some(Verdict::Business));
    }

    #[test]
    fn plain_person_proceeds() {
        let screening = classifier().classify("jane.doe@example.org");
        assert!(matches!(screening, Screening::Proceed(_)));
        assert_eq!(screening.verdict(), None);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let screening = classifier().classify("  jane@example.org\t");
        let address = screening.address().expect("parsed");
        assert_eq!(address.original, "  jane@example.org\t");
        assert_eq!(address.corrected(), "jane@example.org");
    }

    proptest! {
        #[test]
        fn classify_never_panics_and_keeps_original(raw in "\\PC{0,64}") {
            let screening = classifier().classify(&raw);
            match &screening {
                Screening::Malformed { original, .. } => prop_assert_eq!(original, &raw),
                Screening::Settled { address, .. } | Screening::Proceed(address) => {
                    prop_assert_eq!(&address.original, &raw)
                }
            }
        }

        #[test]
        fn generated_valid_addresses_pass_syntax(
            local in "[a-z0-9][a-z0-9._+-]{0,15}",
            label in "[a-z0-9][a-z0-9-]{0,10}",
            tld in "[a-z]{2,6}",
        ) {
            let raw = format!("{local}@{label}.{tld}");
            let screening = Classifier::new(ClassifierTables::empty()).classify(&raw);
            prop_assert!(matches!(screening, Screening::Proceed(_)), "{:?}", screening);
        }
    }
}
