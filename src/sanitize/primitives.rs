//! Single-value sanitizers.
//!
//! # Responsibilities
//! - Escape HTML-significant characters in free text
//! - Normalize and validate email addresses
//! - Accept only http/https absolute URLs
//! - Strip path traversal from client-supplied filenames
//!
//! # Design Decisions
//! - Every function is total: invalid input yields `None` or a safe fallback
//! - Text escaping runs after script schemes and query operators are neutralized

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::{Host, Url};

/// Maximum length of a sanitized filename, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Name used when nothing safe remains of a client-supplied filename.
pub const FALLBACK_FILENAME: &str = "untitled";

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;

static SCRIPT_SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:java|vb|live)script\s*:|data\s*:\s*text/html").expect("valid regex")
});

static OPERATOR_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\$(where|ne|eq|gte?|lte?|n?in|regex|expr|function|accumulator|or|and|not|nor|exists|elemmatch|text|jsonschema|size|all|mod|type)\b",
    )
    .expect("valid regex")
});

static EMAIL_LOCAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*$")
        .expect("valid regex")
});

static DOMAIN_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex"));

static TLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z]{2,63}|xn--[a-z0-9-]{1,59})$").expect("valid regex"));

static FILENAME_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\?%*:|"<>\x00-\x1f\x7f]"#).expect("valid regex"));

/// Escape HTML-significant characters.
///
/// Not idempotent: `&amp;` escapes again to `&amp;amp;`.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Remove script-capable URL schemes and defang query operator tokens.
fn neutralize(input: &str) -> String {
    let mut current = input.to_string();
    // Removal can splice a new scheme together ("javajavascript:script:").
    loop {
        let next = SCRIPT_SCHEME_RE.replace_all(&current, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    OPERATOR_TOKEN_RE.replace_all(&current, "_${1}").into_owned()
}

/// Sanitize free text for storage and later rendering.
pub fn sanitize_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    escape_html(&neutralize(input))
}

/// Like [`sanitize_text`], but non-string values yield an empty string.
pub fn sanitize_text_value(value: &Value) -> String {
    match value {
        Value::String(s) => sanitize_text(s),
        _ => String::new(),
    }
}

/// Normalize and validate an email address.
///
/// Returns `None` for anything that is not a syntactically valid address.
pub fn sanitize_email(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_EMAIL_LEN {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    let (local, domain) = lowered.rsplit_once('@')?;
    if local.contains('@') {
        return None;
    }

    let (local, domain) = normalize_mailbox(local, domain);
    if local.is_empty() || local.len() > MAX_LOCAL_PART_LEN {
        return None;
    }
    if !EMAIL_LOCAL_RE.is_match(&local) || !is_valid_domain(&domain) {
        return None;
    }

    let normalized = format!("{local}@{domain}");
    (normalized.len() <= MAX_EMAIL_LEN).then_some(normalized)
}

/// Provider-specific mailbox canonicalization.
fn normalize_mailbox(local: &str, domain: &str) -> (String, String) {
    match domain {
        "gmail.com" | "googlemail.com" => {
            let base = local.split('+').next().unwrap_or_default();
            (base.replace('.', ""), "gmail.com".to_string())
        }
        "outlook.com" | "hotmail.com" | "live.com" | "icloud.com" | "me.com" => {
            let base = local.split('+').next().unwrap_or_default();
            (base.to_string(), domain.to_string())
        }
        "yahoo.com" | "ymail.com" | "rocketmail.com" => {
            let base = local.split('-').next().unwrap_or_default();
            (base.to_string(), domain.to_string())
        }
        _ => (local.to_string(), domain.to_string()),
    }
}

/// A fully qualified domain: at least two labels and an alphabetic TLD.
fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || domain.len() > 253 {
        return false;
    }
    let Some(tld) = labels.last() else {
        return false;
    };
    TLD_RE.is_match(tld) && labels.iter().all(|label| DOMAIN_LABEL_RE.is_match(label))
}

/// Accept only absolute `http`/`https` URLs with an explicit scheme.
///
/// Returns the parsed, normalized serialization of the URL.
pub fn sanitize_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }

    let (scheme, rest) = trimmed.split_once("://")?;
    if !(scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")) {
        return None;
    }
    if rest.is_empty() {
        return None;
    }

    let url = Url::parse(trimmed).ok()?;
    match url.host()? {
        Host::Domain(domain) => {
            if !is_valid_domain(domain) {
                return None;
            }
        }
        Host::Ipv4(_) | Host::Ipv6(_) => {}
    }

    Some(url.to_string())
}

/// Make a client-supplied filename safe to use as a single path component.
pub fn sanitize_filename(input: &str) -> String {
    let mut current = FILENAME_STRIP_RE.replace_all(input, "").into_owned();
    while current.contains("..") {
        current = current.replace("..", "");
    }

    let truncated: String = current.trim().chars().take(MAX_FILENAME_LEN).collect();
    let truncated = truncated.trim();
    if truncated.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        truncated.to_string()
    }
}
