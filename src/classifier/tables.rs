use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead};

use phf::{phf_map, phf_set};

/// Known disposable, temporary-inbox and honeypot domains.
pub static DISPOSABLE_DOMAINS: phf::Set<&'static str> = phf_set! {
    "spamtrap.com",
    "temp-mail.org",
    "10minutemail.com",
    "guerrillamail.com",
    "mailinator.com",
    "yopmail.com",
    "trashmail.com",
    "getnada.com",
    "maildrop.cc",
    "fakemail.net",
    "emailondeck.com",
    "dispostable.com",
    "mailcatch.com",
    "moakt.com",
    "burnermail.io",
    "tempmailaddress.com",
    "fakeinbox.com",
    "mytemp.email",
    "safetymail.info",
    "tempmailo.com",
};

/// Substrings of the local part that denote shared or role mailboxes.
pub static BUSINESS_KEYWORDS: &[&str] = &[
    "info",
    "help",
    "support",
    "contact",
    "forgotpassword",
    "passwordhelp",
    "sales",
    "team",
    "legal",
    "press",
    "privacy",
    "feedback",
    "noreply",
    "marketing",
    "service",
    "compliance",
    "orders",
    "techsupport",
    "projects",
    "development",
    "partnerships",
    "newsletter",
    "returns",
    "security",
    "shipping",
    "management",
    "complaints",
    "finance",
    "questions",
];

/// Misspelling → canonical domain.
pub static DOMAIN_TYPOS: phf::Map<&'static str, &'static str> = phf_map! {
    "hotmnail.com" => "hotmail.com",
    "hotmail.net" => "hotmail.com",
    "hotmaill.com" => "hotmail.com",
    "hotmial.com" => "hotmail.com",
    "hotmil.com" => "hotmail.com",
    "hotmai.com" => "hotmail.com",
    "hotmaul.com" => "hotmail.com",
    "hotmal.com" => "hotmail.com",
    "gmail.net" => "gmail.com",
    "gmnail.com" => "gmail.com",
    "gmail.co" => "gmail.com",
    "gmial.com" => "gmail.com",
    "gamil.com" => "gmail.com",
    "gmaill.com" => "gmail.com",
    "gmaol.com" => "gmail.com",
    "gmaik.com" => "gmail.com",
    "gmaio.com" => "gmail.com",
    "uotlook.com" => "outlook.com",
    "outlook.net" => "outlook.com",
    "outllook.com" => "outlook.com",
    "otulook.com" => "outlook.com",
    "outllok.com" => "outlook.com",
    "otlook.com" => "outlook.com",
    "outlok.com" => "outlook.com",
    "oulook.com" => "outlook.com",
};

/// Lookup tables consulted by [`Classifier`](super::Classifier).
///
/// Built once, then shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierTables {
    /// typo → canonical, keys and values lower-cased.
    pub typos: HashMap<String, String>,
    pub disposable: HashSet<String>,
    pub business_keywords: Vec<String>,
}

impl Default for ClassifierTables {
    fn default() -> Self {
        Self {
            typos: DOMAIN_TYPOS
                .entries()
                .map(|(typo, canonical)| (typo.to_string(), canonical.to_string()))
                .collect(),
            disposable: DISPOSABLE_DOMAINS.iter().map(|d| d.to_string()).collect(),
            business_keywords: BUSINESS_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ClassifierTables {
    /// Tables with nothing in them; every syntactically valid address proceeds.
    pub fn empty() -> Self {
        Self {
            typos: HashMap::new(),
            disposable: HashSet::new(),
            business_keywords: Vec::new(),
        }
    }

    /// Registers `typos` as misspellings of `canonical`.
    pub fn add_typos<I, S>(&mut self, canonical: &str, typos: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let canonical = canonical.trim().to_ascii_lowercase();
        for typo in typos {
            let typo = typo.as_ref().trim().to_ascii_lowercase();
            if !typo.is_empty() && typo != canonical {
                self.typos.insert(typo, canonical.clone());
            }
        }
    }

    pub fn add_disposable<I, S>(&mut self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.disposable.extend(
            domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty()),
        );
    }

    pub fn add_business_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_ascii_lowercase();
            if !keyword.is_empty() && !self.business_keywords.contains(&keyword) {
                self.business_keywords.push(keyword);
            }
        }
    }

    /// Merges a newline-separated block-list into the disposable set.
    /// Blank lines and `#` comments are skipped. Returns how many entries were read.
    pub fn load_blocklist<R: BufRead>(&mut self, reader: R) -> io::Result<usize> {
        let mut count = 0;
        for line in reader.lines() {
            let line = line?;
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            self.add_disposable([entry]);
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_known_typos() {
        let tables = ClassifierTables::default();
        assert_eq!(tables.typos.get("gmial.com").map(String::as_str), Some("gmail.com"));
        assert_eq!(tables.typos.get("otlook.com").map(String::as_str), Some("outlook.com"));
        assert!(tables.disposable.contains("mailinator.com"));
        assert!(tables.business_keywords.iter().any(|k| k == "support"));
    }

    #[test]
    fn blocklist_skips_comments_and_blanks() {
        let mut tables = ClassifierTables::empty();
        let input = "# header\n\nBurner.Example.\n  junk.test  \n";
        let read = tables.load_blocklist(input.as_bytes()).expect("read blocklist");
        assert_eq!(read, 2);
        assert!(tables.disposable.contains("burner.example"));
        assert!(tables.disposable.contains("junk.test"));
    }

    #[test]
    fn add_typos_ignores_identity_mapping() {
        let mut tables = ClassifierTables::empty();
        tables.add_typos("Example.com", ["exmaple.com", "example.com"]);
        assert_eq!(tables.typos.len(), 1);
        assert_eq!(tables.typos["exmaple.com"], "example.com");
    }
}
