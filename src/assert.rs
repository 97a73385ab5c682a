//! Response assertions.
//!
//! Each check returns `Err(AssertionFailure)` on the first mismatch and is
//! independent of the others, so checks compose with `?`:
//!
//! ```rust,ignore
//! use wiretest::assert::{expect_status, expect_header, expect_body_field};
//!
//! expect_status(&resp, 200)?;
//! expect_header(&resp, "content-type", "application/json; charset=utf-8")?;
//! expect_body_field(&resp, "/args/param4", json!(["foo", "bar"]))?;
//! ```
//!
//! Body paths are JSON Pointers (`/args/param4`, `/files/0`). A path without
//! a leading `/` is read as dot-separated keys (`args.param4`).

use serde_json::Value;

use crate::error::AssertionFailure;
use crate::response::Response;

type Outcome = Result<(), AssertionFailure>;

pub fn expect_status(resp: &Response, expected: u16) -> Outcome {
    if resp.status() == expected {
        Ok(())
    } else {
        Err(AssertionFailure::StatusMismatch {
            expected,
            actual: resp.status(),
        })
    }
}

fn header_path(name: &str) -> String {
    format!("header:{}", name.to_ascii_lowercase())
}

/// Header `name` has exactly `expected`. Any value of a repeated header may match.
pub fn expect_header(resp: &Response, name: &str, expected: &str) -> Outcome {
    let values = resp.header_all(name);
    if values.is_empty() {
        return Err(AssertionFailure::missing(header_path(name)));
    }
    if values.iter().any(|v| *v == expected) {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(
            header_path(name),
            expected,
            values.join(", "),
        ))
    }
}

pub fn expect_no_header(resp: &Response, name: &str) -> Outcome {
    let values = resp.header_all(name);
    if values.is_empty() {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(
            header_path(name),
            "<absent>",
            values.join(", "),
        ))
    }
}

pub fn expect_header_prefix(resp: &Response, name: &str, prefix: &str) -> Outcome {
    expect_header_where(resp, name, prefix, "starting with", |v| v.starts_with(prefix))
}

pub fn expect_header_contains(resp: &Response, name: &str, needle: &str) -> Outcome {
    expect_header_where(resp, name, needle, "containing", |v| v.contains(needle))
}

fn expect_header_where(
    resp: &Response,
    name: &str,
    wanted: &str,
    relation: &str,
    check: impl Fn(&str) -> bool,
) -> Outcome {
    let values = resp.header_all(name);
    if values.is_empty() {
        return Err(AssertionFailure::missing(header_path(name)));
    }
    if values.iter().any(|&v| check(v)) {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(
            header_path(name),
            format!("value {} {:?}", relation, wanted),
            values.join(", "),
        ))
    }
}

/// Charset parameter of `Content-Type` equals `expected` (case-insensitive).
pub fn expect_charset(resp: &Response, expected: &str) -> Outcome {
    match resp.charset() {
        None => Err(AssertionFailure::missing("header:content-type;charset")),
        Some(actual) if actual.eq_ignore_ascii_case(expected) => Ok(()),
        Some(actual) => Err(AssertionFailure::mismatch(
            "header:content-type;charset",
            expected,
            actual,
        )),
    }
}

/// Field at `path` deep-equals `expected`.
///
/// Object key order is ignored, array order is not. A response without a
/// JSON body has no fields.
pub fn expect_body_field(resp: &Response, path: &str, expected: impl Into<Value>) -> Outcome {
    let expected = expected.into();
    let actual = body_field(resp, path)?;
    if *actual == expected {
        Ok(())
    } else {
        Err(AssertionFailure::mismatch(
            path,
            expected.to_string(),
            actual.to_string(),
        ))
    }
}

/// Field at `path` is present, whatever its value.
pub fn expect_body_has(resp: &Response, path: &str) -> Outcome {
    body_field(resp, path).map(|_| ())
}

/// Whole JSON body deep-equals `expected`.
pub fn expect_body(resp: &Response, expected: impl Into<Value>) -> Outcome {
    expect_body_field(resp, "", expected)
}

/// Decoded text body equals `expected`.
pub fn expect_text(resp: &Response, expected: &str) -> Outcome {
    match resp.text() {
        Ok(text) if text == expected => Ok(()),
        Ok(text) => Err(AssertionFailure::mismatch("text", expected, text)),
        Err(e) => Err(AssertionFailure::mismatch("text", expected, e.to_string())),
    }
}

fn body_field<'a>(resp: &'a Response, path: &str) -> Result<&'a Value, AssertionFailure> {
    let root = resp.json().ok_or_else(|| AssertionFailure::missing(path))?;
    root.pointer(&to_pointer(path))
        .ok_or_else(|| AssertionFailure::missing(path))
}

/// Normalize a path to JSON Pointer syntax.
fn to_pointer(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        return path.to_string();
    }
    path.split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect()
}
