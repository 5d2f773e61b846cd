//! Shared utility helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix-epoch time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Truncate a string to `max` bytes on a char boundary, appending `…` if trimmed.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Truncate an owned UTF-8 `String` to at most `max_bytes` on a char
/// boundary.
pub fn truncate_utf8_owned(mut s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}

/// Resolve a `$ENV_VAR` reference, returning plain values unchanged.
///
/// Unset variables resolve to an empty string.
pub fn resolve_env_ref(raw: &str) -> String {
    match raw.strip_prefix('$') {
        Some(var) => std::env::var(var).unwrap_or_default(),
        None => raw.to_string(),
    }
}
