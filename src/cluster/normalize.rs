//! Template normalization: masks the variable parts of a message so that
//! lines produced by the same log statement share one key.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters kept before a key is cut off
pub const MAX_KEY_CHARS: usize = 180;

/// Appended to keys that were cut off
pub const TRUNCATION_MARKER: char = '…';

// Quoted literals go first so later passes never rewrite their contents
static RE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'"#).expect("quoted string pattern"));

static RE_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .expect("guid pattern")
});

static RE_HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b").expect("hex pattern"));

static RE_IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").expect("ipv4 pattern"));

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[\w.-]+@[\w.-]+\.\w+\b").expect("email pattern"));

// Unix absolute paths and drive-letter Windows paths
static RE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[A-Za-z]:\\|/)[\w\-/\\.]+").expect("path pattern"));

static RE_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").expect("integer pattern"));

static RE_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("group pattern"));

static RE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Reduce a message to its template key.
///
/// Returns an empty string when nothing but variable content was present;
/// callers drop such keys.
pub fn normalize_message(message: &str) -> String {
    let s = message.trim();
    let s = RE_QUOTED.replace_all(s, "<str>");
    let s = RE_GUID.replace_all(&s, "<guid>");
    let s = RE_HEX.replace_all(&s, "<hex>");
    let s = RE_IPV4.replace_all(&s, "<ip>");
    let s = RE_EMAIL.replace_all(&s, "<email>");
    let s = RE_PATH.replace_all(&s, "<path>");
    let s = RE_INT.replace_all(&s, "<num>");
    let s = RE_GROUP.replace_all(&s, " ");
    let s = RE_SPACE.replace_all(&s, " ");

    let mut key = s.trim().to_string();
    if let Some((cut, _)) = key.char_indices().nth(MAX_KEY_CHARS) {
        key.truncate(cut);
        key.push(TRUNCATION_MARKER);
    }
    key
}
