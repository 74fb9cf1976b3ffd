//! Timestamp and severity detection for a single line prefix.
//!
//! Only one timestamp layout is recognized: `YYYY-MM-DD[ |T]HH:MM:SS`, with any
//! fractional seconds ignored. Keys are digit-packed integers, not epochs, so
//! numeric order equals chronological order without any calendar math.

use crate::error::LogsiftError;
use std::fmt;
use std::str::FromStr;

/// Length of the recognized timestamp prefix
pub const TIMESTAMP_LEN: usize = 19;

/// Stored level code meaning "no level detected"
pub const UNKNOWN_LEVEL: u8 = 255;

/// Characters inspected by [`detect_level`]
const LEVEL_SCAN_CHARS: usize = 200;

/// Severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
    Critical = 6,
}

/// Tokens searched for, in priority order. `WARNING` folds into `Warn`.
const LEVEL_WORDS: [(&str, Level); 8] = [
    ("TRACE", Level::Trace),
    ("DEBUG", Level::Debug),
    ("INFO", Level::Info),
    ("WARN", Level::Warn),
    ("WARNING", Level::Warn),
    ("ERROR", Level::Error),
    ("FATAL", Level::Fatal),
    ("CRITICAL", Level::Critical),
];

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Critical,
    ];

    /// Code stored in the index
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Level> {
        Level::ALL.get(usize::from(code)).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Critical => "CRITICAL",
        }
    }

    /// Parse a level name, case-insensitively. `WARNING` is accepted.
    pub fn from_name(name: &str) -> Option<Level> {
        let upper = name.trim().to_ascii_uppercase();
        LEVEL_WORDS
            .iter()
            .find(|(word, _)| *word == upper)
            .map(|(_, level)| *level)
    }

    /// ERROR, FATAL, and CRITICAL
    pub fn is_error_like(self) -> bool {
        self >= Level::Error
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LogsiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::from_name(s)
            .ok_or_else(|| LogsiftError::invalid_argument(format!("unknown level '{}'", s)))
    }
}

/// Digit-packed keys for a parsed timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampKeys {
    /// `YYYYMMDDHHMMSS`
    pub second_key: u64,
    /// `YYYYMMDDHHMM`
    pub minute_key: u64,
}

/// Parse the fixed-layout timestamp in the first 19 characters of `text`.
pub fn parse_timestamp_prefix(text: &str) -> Option<TimestampKeys> {
    let s = text.get(..TIMESTAMP_LEN)?.as_bytes();

    if s[4] != b'-' || s[7] != b'-' || !matches!(s[10], b' ' | b'T') || s[13] != b':' || s[16] != b':'
    {
        return None;
    }

    let year = parse_digits(&s[0..4])?;
    let month = parse_digits(&s[5..7])?;
    let day = parse_digits(&s[8..10])?;
    let hour = parse_digits(&s[11..13])?;
    let minute = parse_digits(&s[14..16])?;
    let second = parse_digits(&s[17..19])?;

    let minute_key = (((year * 100 + month) * 100 + day) * 100 + hour) * 100 + minute;
    Some(TimestampKeys {
        second_key: minute_key * 100 + second,
        minute_key,
    })
}

fn parse_digits(bytes: &[u8]) -> Option<u64> {
    bytes.iter().try_fold(0u64, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u64::from(b - b'0'))
    })
}

/// Split a line into its timestamp prefix (if one is detected) and the message.
///
/// The message has separator characters (space, hyphen, tab, pipe) that
/// follow the timestamp removed.
pub fn strip_timestamp(line: &str) -> (Option<&str>, &str) {
    if parse_timestamp_prefix(line).is_none() {
        return (None, line);
    }
    let (timestamp, rest) = line.split_at(TIMESTAMP_LEN);
    let message = rest.trim_start_matches(is_separator);
    (Some(timestamp), message)
}

/// Remove a leading marker for `level` together with the separators that
/// follow it.
///
/// `[INFO]`, `(info)` and `Info:` match in any case. A bare `INFO ` only
/// matches upper-case, so a sentence such as `Error connecting to db` keeps
/// its first word.
pub fn strip_level_marker(message: &str, level: Level) -> &str {
    let bytes = message.as_bytes();
    for (word, _) in LEVEL_WORDS.iter().filter(|(_, l)| *l == level) {
        let marker_len = match bytes.first() {
            Some(b'[') if word_then(bytes, 1, word, b']', false) => word.len() + 2,
            Some(b'(') if word_then(bytes, 1, word, b')', false) => word.len() + 2,
            _ if word_then(bytes, 0, word, b':', false) || word_then(bytes, 0, word, b' ', true) => {
                word.len() + 1
            }
            _ => continue,
        };
        return message[marker_len..].trim_start_matches(is_separator);
    }
    message
}

fn word_then(bytes: &[u8], start: usize, word: &str, close: u8, exact_case: bool) -> bool {
    let end = start + word.len();
    bytes.get(start..end).is_some_and(|candidate| {
        if exact_case {
            candidate == word.as_bytes()
        } else {
            candidate.eq_ignore_ascii_case(word.as_bytes())
        }
    }) && bytes.get(end) == Some(&close)
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '-' | '\t' | '|')
}

/// Render a minute key as `YYYY-MM-DD HH:MM`.
pub fn format_minute_key(minute_key: u64) -> String {
    let digits = format!("{:012}", minute_key);
    format!(
        "{}-{}-{} {}:{}",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8],
        &digits[8..10],
        &digits[10..12]
    )
}

/// Detect a severity token near the start of a line.
///
/// Space-delimited tokens win over bracketed or colon-suffixed ones, and
/// within each pass tokens are tried in [`LEVEL_WORDS`] order.
pub fn detect_level(text: &str) -> Option<Level> {
    let upper: String = text
        .chars()
        .take(LEVEL_SCAN_CHARS)
        .flat_map(char::to_uppercase)
        .collect();

    LEVEL_WORDS
        .iter()
        .find(|(word, _)| has_wrapped_token(&upper, word, b' ', b' '))
        .or_else(|| {
            LEVEL_WORDS.iter().find(|(word, _)| {
                has_wrapped_token(&upper, word, b'[', b']')
                    || has_wrapped_token(&upper, word, b'(', b')')
                    || has_colon_token(&upper, word)
            })
        })
        .map(|(_, level)| *level)
}

fn has_wrapped_token(haystack: &str, word: &str, open: u8, close: u8) -> bool {
    let bytes = haystack.as_bytes();
    haystack.match_indices(word).any(|(pos, _)| {
        pos > 0 && bytes[pos - 1] == open && bytes.get(pos + word.len()) == Some(&close)
    })
}

fn has_colon_token(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    haystack.match_indices(word).any(|(pos, _)| {
        bytes.get(pos + word.len()) == Some(&b':')
            && (pos == 0 || !bytes[pos - 1].is_ascii_alphanumeric())
    })
}
