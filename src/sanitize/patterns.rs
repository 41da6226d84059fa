//! Denylist detection of code-bearing input.
//!
//! This is an auxiliary signal for logging and early rejection. It does not
//! replace escaping: a negative result says nothing about safety.

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde_json::Value;

static SUSPICIOUS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?is)<script\b[^>]*>.*?</script\s*>",
        r"(?i)<script\b",
        r"(?i)javascript\s*:",
        r"(?i)vbscript\s*:",
        r"(?i)data\s*:\s*text/html",
        r"(?i)\bon[a-z]+\s*=",
        r"(?i)\beval\s*\(",
        r"(?i)\bexpression\s*\(",
        r"(?i)\burl\s*\(",
        r"(?i)\bimport\s*\(",
        r"(?i)<(?:iframe|object|embed|applet)\b",
    ])
    .expect("valid regex set")
});

/// Whether the input matches any known script-injection pattern.
pub fn has_suspicious_patterns(input: &str) -> bool {
    !input.is_empty() && SUSPICIOUS.is_match(input)
}

/// Whether any key or string leaf of a decoded JSON value is suspicious.
///
/// Runs on parsed values so JSON escapes like `\u003c` cannot hide markup.
pub fn value_has_suspicious_patterns(value: &Value) -> bool {
    match value {
        Value::String(s) => has_suspicious_patterns(s),
        Value::Array(items) => items.iter().any(value_has_suspicious_patterns),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| has_suspicious_patterns(k) || value_has_suspicious_patterns(v)),
        _ => false,
    }
}

/// Whether a raw query string is suspicious once percent-decoded.
pub fn query_has_suspicious_patterns(query: &str) -> bool {
    has_suspicious_patterns(query)
        || url::form_urlencoded::parse(query.as_bytes())
            .any(|(k, v)| has_suspicious_patterns(&k) || has_suspicious_patterns(&v))
}
