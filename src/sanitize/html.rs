//! Allowlist HTML sanitizer for trusted rich-text fields.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Tags kept by [`sanitize_html`] when no allowlist is supplied.
pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "u", "ol", "ul", "li", "a", "span",
];

const ALLOWED_ATTRS: &[&str] = &["href", "target", "rel"];
const SAFE_HREF_SCHEMES: &[&str] = &["http", "https", "mailto"];

static DROP_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<(script|style|iframe|object|embed|applet|template)\b[^>]*>.*?</\s*(?:script|style|iframe|object|embed|applet|template)\s*>")
        .expect("valid regex")
});

static UNCLOSED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed|applet|template)\b.*$")
        .expect("valid regex")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^<>]*)>").expect("valid regex"));

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("valid regex")
});

/// Keep only allowlisted tags and attributes; drop everything else but its text.
///
/// Script-like blocks (`script`, `style`, `iframe`, ...) are removed with their
/// content. Stray angle brackets in text are escaped.
pub fn sanitize_html(html: &str, allowed_tags: Option<&[&str]>) -> String {
    if html.is_empty() {
        return String::new();
    }
    let allowed = allowed_tags.unwrap_or(DEFAULT_ALLOWED_TAGS);

    let without_blocks = DROP_BLOCK_RE.replace_all(html, "");
    let without_blocks = UNCLOSED_BLOCK_RE.replace_all(&without_blocks, "");

    let mut out = String::with_capacity(without_blocks.len());
    let mut last = 0;
    for caps in TAG_RE.captures_iter(&without_blocks) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_text(&mut out, &without_blocks[last..whole.start()]);
        out.push_str(&rebuild_tag(&caps, allowed));
        last = whole.end();
    }
    push_text(&mut out, &without_blocks[last..]);
    out
}

fn push_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn rebuild_tag(caps: &Captures<'_>, allowed: &[&str]) -> String {
    let closing = !caps[1].is_empty();
    let name = caps[2].to_ascii_lowercase();
    if !allowed.iter().any(|tag| tag.eq_ignore_ascii_case(&name)) {
        return String::new();
    }
    if closing {
        return format!("</{name}>");
    }

    let mut tag = format!("<{name}");
    let raw_attrs = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
    for attr in ATTR_RE.captures_iter(raw_attrs) {
        let attr_name = attr[1].to_ascii_lowercase();
        if !ALLOWED_ATTRS.contains(&attr_name.as_str()) {
            continue;
        }
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if attr_name == "href" && !is_safe_href(value) {
            continue;
        }
        tag.push_str(&format!(" {attr_name}=\"{}\"", escape_attr(value)));
    }
    tag.push('>');
    tag
}

/// Relative references are fine; absolute ones must use a known-safe scheme.
fn is_safe_href(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let scheme_end = compact.find(':');
    let path_start = compact.find(['/', '?', '#']);
    match (scheme_end, path_start) {
        (Some(colon), Some(slash)) if slash < colon => true,
        (Some(colon), _) => SAFE_HREF_SCHEMES.contains(&&compact[..colon]),
        (None, _) => true,
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
