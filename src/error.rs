//! Error types for wiretest crate.

use std::fmt;
use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building, sending or verifying a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two different body encodings were requested on the same builder.
    #[error("conflicting body mode: {requested} body requested while {active} body is active")]
    ConflictingBodyMode {
        active: BodyMode,
        requested: BodyMode,
    },

    /// Multipart part violates its invariants.
    #[error("invalid multipart part: {0}")]
    InvalidPart(String),

    /// Header name or value cannot be written to the wire.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// `Set-Cookie` header could not be parsed.
    #[error("cookie parse error: {0}")]
    CookieParse(String),

    /// Target could not be turned into an absolute URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Fixture or file part could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network or protocol failure while executing a request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response did not match an expectation.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
}

impl Error {
    /// Create an invalid part error.
    pub fn invalid_part(message: impl Into<String>) -> Self {
        Self::InvalidPart(message.into())
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader(message.into())
    }

    /// Transport failure kind, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Assertion failure, if this is one.
    pub fn as_assertion(&self) -> Option<&AssertionFailure> {
        match self {
            Self::Assertion(a) => Some(a),
            _ => None,
        }
    }
}

/// Body encodings a request builder can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Json,
    Form,
    Multipart,
}

impl BodyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Form => "form",
            Self::Multipart => "multipart",
        }
    }
}

impl fmt::Display for BodyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// DNS resolution or TCP/TLS connect failed.
    Unreachable,
    /// Connect or total deadline exceeded.
    Timeout,
    /// Content-Encoding could not be decoded.
    DecodeFailure,
    /// Body declared as JSON could not be decoded or parsed.
    MalformedBody,
    /// Response framing or I/O broke mid-exchange.
    Protocol,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::DecodeFailure => "decode failure",
            Self::MalformedBody => "malformed body",
            Self::Protocol => "protocol error",
        }
    }
}

/// Network/protocol layer failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error ({}): {message}", .kind.as_str())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn decode_failure(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::DecodeFailure, message)
    }

    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::MalformedBody, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }
}

/// A response that did not match an expectation.
///
/// `expected` and `actual` are rendered as text (JSON for body values) so
/// failures print the same way regardless of which check produced them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertionFailure {
    #[error("expected status {expected}, got {actual}")]
    StatusMismatch { expected: u16, actual: u16 },

    #[error("missing property `{path}`")]
    MissingProperty { path: String },

    #[error("value mismatch at `{path}`: expected {expected}, got {actual}")]
    ValueMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

impl AssertionFailure {
    pub fn missing(path: impl Into<String>) -> Self {
        Self::MissingProperty { path: path.into() }
    }

    pub fn mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ValueMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn is_missing_property(&self) -> bool {
        matches!(self, Self::MissingProperty { .. })
    }

    pub fn is_value_mismatch(&self) -> bool {
        matches!(self, Self::ValueMismatch { .. })
    }
}
