//! Redaction of request details before they reach a log line.
//!
//! Transports and the session both log requests, and neither may depend on
//! the other, so the helpers live next to the [`Request`](crate::Request)
//! type. `core_runtime::logging` re-exports them.

use std::collections::{BTreeMap, HashMap};

/// Substrings marking a header or field name whose value is a credential.
const SENSITIVE_FIELDS: &[&str] = &[
    "token",
    "password",
    "secret",
    "api_key",
    "authorization",
    "cookie",
    "bearer",
];

const REDACTED: &str = "[REDACTED]";

/// `value`, or `[REDACTED]` when `field_name` names a credential.
///
/// ```
/// use bridge_traits::redact::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("Authorization", "Bearer abc"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("Accept", "text/plain"), "text/plain");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|&f| field_lower.contains(f)) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

/// Request headers in name order with credential values redacted.
pub fn redact_headers(headers: &HashMap<String, String>) -> BTreeMap<&str, String> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str(), redact_if_sensitive(name, value)))
        .collect()
}

/// Drop user-info, query string and fragment from a URL.
///
/// ```
/// use bridge_traits::redact::redact_url;
///
/// assert_eq!(
///     redact_url("https://user:pw@example.com/file?sig=abc"),
///     "https://example.com/file"
/// );
/// ```
pub fn redact_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    let Some((scheme, rest)) = without_query.split_once("://") else {
        return without_query.to_string();
    };

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    let host = authority.rsplit('@').next().unwrap_or(authority);

    format!("{}://{}{}", scheme, host, path)
}
