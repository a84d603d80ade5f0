//! DNS hostname syntax checks.

/// Returns `true` when `hostname` looks like a DNS hostname.
///
/// The name is a sequence of dot separated labels. Every label is made of
/// ASCII letters, digits and hyphens, is at least one character long and
/// neither starts nor ends with a hyphen. A single label (`localhost`) is
/// accepted. Comparison is case-insensitive, so no normalisation is done.
///
/// ```
/// use sanchecker::hostname::is_valid_hostname;
///
/// assert!(is_valid_hostname("a-b.example.co.uk"));
/// assert!(!is_valid_hostname("bad..com"));
/// ```
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() {
        return false;
    }
    hostname.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        }
        _ => false,
    }
}
