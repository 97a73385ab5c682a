//! Ordered header lists with case-insensitive lookup.
//!
//! Requests keep headers as `(name, value)` pairs so the wire order matches
//! the order they were set in. Names compare case-insensitively.

use crate::error::{Error, Result};

/// Default `User-Agent` sent by the harness.
pub const USER_AGENT: &str = concat!("wiretest/", env!("CARGO_PKG_VERSION"));

/// Default `Accept-Encoding`.
pub const ACCEPT_ENCODING: &str = "gzip";

/// Headers every request starts from unless overridden.
pub fn default_headers() -> Vec<(String, String)> {
    vec![
        ("User-Agent".to_string(), USER_AGENT.to_string()),
        ("Accept".to_string(), "*/*".to_string()),
        ("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()),
    ]
}

/// Set a header, replacing any existing value with the same name.
pub fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}

/// Set a header only if no header with that name is present.
pub fn set_default(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !has_header(headers, name) {
        headers.push((name.to_string(), value.to_string()));
    }
}

/// Find a header value by name (case-insensitive).
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Check whether a header is present (case-insensitive).
pub fn has_header(headers: &[(String, String)], name: &str) -> bool {
    find_header(headers, name).is_some()
}

/// Validate a header name per RFC 9110 Section 5.1.
///
/// Header names must be tokens: 1*tchar where tchar excludes
/// delimiters, control characters, and whitespace.
pub fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_header("empty header name"));
    }
    if let Some(b) = name.bytes().find(|b| !is_tchar(*b)) {
        return Err(Error::invalid_header(format!(
            "invalid character {:?} in header name {:?}",
            b as char, name
        )));
    }
    Ok(())
}

/// Validate a header value per RFC 9110 Section 5.5.
///
/// Header values must not contain NUL, CR, or LF.
pub fn validate_header_value(name: &str, value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::invalid_header(format!(
            "CR/LF/NUL not allowed in value of {:?}",
            name
        )));
    }
    Ok(())
}

fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}
