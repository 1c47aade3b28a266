//! Distinguished name helpers for proxy-forwarded certificate fields.
//!
//! Proxies emit DNs either in RFC 2253 order (`CN=..,OU=..,C=US`) or in the legacy
//! slash form (`/C=US/OU=../CN=..`). Both normalize to the same string.

use regex::Regex;
use std::sync::OnceLock;

static EDIPI_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn edipi_pattern() -> Option<&'static Regex> {
    EDIPI_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z'\-]+(?:\.[A-Za-z'\-]+)*\.(\d{10})$").ok())
        .as_ref()
}

/// Upper-case attribute names, trimmed values, RDNs sorted and joined with `,`.
///
/// Returns `None` when no `attr=value` pair can be parsed.
#[must_use]
pub fn normalize_dn(dn: &str) -> Option<String> {
    let mut rdns: Vec<String> = Vec::new();
    for part in dn.split([',', '/']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (attr, value) = part.split_once('=')?;
        let attr = attr.trim().to_ascii_uppercase();
        let value = value.trim();
        if attr.is_empty() || value.is_empty() {
            return None;
        }
        rdns.push(format!("{attr}={value}"));
    }
    if rdns.is_empty() {
        return None;
    }
    rdns.sort();
    Some(rdns.join(","))
}

/// Value of the first `CN` attribute.
#[must_use]
pub fn common_name(dn: &str) -> Option<String> {
    dn.split([',', '/']).find_map(|part| {
        let (attr, value) = part.trim().split_once('=')?;
        attr.trim()
            .eq_ignore_ascii_case("CN")
            .then(|| value.trim().to_string())
    })
}

/// 10-digit personnel identifier at the end of a `LAST.FIRST.MIDDLE.1234567890` CN.
#[must_use]
pub fn extract_edipi(subject_dn: &str) -> Option<String> {
    let cn = common_name(subject_dn)?;
    let captures = edipi_pattern()?.captures(&cn)?;
    captures.get(1).map(|edipi| edipi.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_both_orders() {
        let rfc = normalize_dn("CN=DOD ID CA-59, OU=PKI, OU=DoD, O=U.S. Government, C=US");
        let slash = normalize_dn("/C=US/O=U.S. Government/OU=DoD/OU=PKI/cn=DOD ID CA-59");
        assert!(rfc.is_some());
        assert_eq!(rfc, slash);
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize_dn(""), None);
        assert_eq!(normalize_dn("not a dn"), None);
        assert_eq!(normalize_dn("CN="), None);
    }

    #[test]
    fn edipi_is_trailing_ten_digits_of_cn() {
        assert_eq!(
            extract_edipi("CN=DOE.JOHN.A.1234567890,OU=USA,OU=PKI,O=U.S. Government,C=US"),
            Some("1234567890".to_string())
        );
        assert_eq!(
            extract_edipi("/C=US/O=U.S. Government/CN=O'BRIEN.MARY.1098765432"),
            Some("1098765432".to_string())
        );
    }

    #[test]
    fn edipi_requires_exact_pattern() {
        assert_eq!(extract_edipi("CN=DOE.JOHN.A.123456789"), None);
        assert_eq!(extract_edipi("CN=DOE.JOHN.A.12345678901"), None);
        assert_eq!(extract_edipi("CN=1234567890"), None);
        assert_eq!(extract_edipi("OU=DOE.JOHN.1234567890"), None);
    }
}
