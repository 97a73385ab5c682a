//! RFC 7617 Basic Authentication credentials.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Generate a Basic Auth header value: "Basic " followed by
/// base64-encoded `username:password`.
pub fn basic_auth(username: &str, password: &str) -> String {
    let plain = format!("{}:{}", username, password);
    format!("Basic {}", BASE64.encode(plain))
}

/// Parse a Basic Auth header value into (username, password).
///
/// The scheme name is matched case-insensitively. Passwords may contain
/// colons; the user-id may not.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(BASE64.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
