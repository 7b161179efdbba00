use once_cell::sync::Lazy;
use regex::Regex;

/// Conservative address shape: ASCII atext subset, dot-separated domain labels,
/// alphabetic top-level label of two characters or more.
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}$")
        .expect("address pattern is a valid regex")
});

/// Checks `input` (already trimmed) and splits it into local part and domain.
pub(crate) fn split_address(input: &str) -> Result<(&str, &str), String> {
    if input.is_empty() {
        return Err("empty address".to_string());
    }
    if input.len() > 254 {
        return Err(format!("total length {} > 254", input.len()));
    }
    if !ADDRESS_RE.is_match(input) {
        return Err(describe_failure(input));
    }
    // the pattern guarantees exactly one '@'
    input
        .split_once('@')
        .ok_or_else(|| "must contain exactly one '@'".to_string())
}

fn describe_failure(input: &str) -> String {
    match input.split_once('@') {
        None => "must contain exactly one '@'".to_string(),
        Some((_, domain)) if domain.contains('@') => "must contain exactly one '@'".to_string(),
        Some(("", _)) => "local part is empty".to_string(),
        Some((_, domain)) if !domain.contains('.') => {
            "domain must contain at least one dot".to_string()
        }
        Some((_, domain)) if domain.split('.').any(str::is_empty) => {
            "empty domain label".to_string()
        }
        Some(_) => "address does not match the accepted syntax".to_string(),
    }
}
