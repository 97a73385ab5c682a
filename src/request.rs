//! Request builder and the immutable request descriptor it produces.
//!
//! ```rust,ignore
//! use wiretest::Request;
//!
//! let request = Request::get("/get?param1=alpha")
//!     .query([("param2", "beta".into()), ("param4", vec!["foo", "bar"].into())])
//!     .build();
//! assert_eq!(
//!     request.query_string().as_deref(),
//!     Some("param1=alpha&param2=beta&param4=foo&param4=bar")
//! );
//! ```

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use url::{form_urlencoded, Url};

use crate::auth::basic_auth;
use crate::error::{BodyMode, Error, Result};
use crate::headers::{find_header, set_header};
use crate::multipart::{self, Part};

/// A query or form value: one string, or a list that repeats its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Values in wire order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::List(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => {
                *self = Self::List(vec![std::mem::take(first), value]);
            }
            Self::List(vs) => vs.push(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Single(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Single(v)
    }
}

impl From<&String> for ParamValue {
    fn from(v: &String) -> Self {
        Self::Single(v.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Single(v.to_string())
    }
}

macro_rules! param_from_display {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(v: $t) -> Self {
                Self::Single(v.to_string())
            }
        })*
    };
}

param_from_display!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<Vec<&str>> for ParamValue {
    fn from(vs: Vec<&str>) -> Self {
        Self::List(vs.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(vs: Vec<String>) -> Self {
        Self::List(vs)
    }
}

impl<const N: usize> From<[&str; N]> for ParamValue {
    fn from(vs: [&str; N]) -> Self {
        Self::List(vs.iter().map(|v| v.to_string()).collect())
    }
}

impl From<&[&str]> for ParamValue {
    fn from(vs: &[&str]) -> Self {
        Self::List(vs.iter().map(|v| v.to_string()).collect())
    }
}

/// Request body, one encoding at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, ParamValue)>),
    Multipart(Vec<Part>),
}

impl Body {
    pub fn mode(&self) -> Option<BodyMode> {
        match self {
            Self::Empty => None,
            Self::Json(_) => Some(BodyMode::Json),
            Self::Form(_) => Some(BodyMode::Form),
            Self::Multipart(_) => Some(BodyMode::Multipart),
        }
    }
}

/// Body bytes ready for the wire, with the content type that describes them.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Immutable request descriptor.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    query: Vec<(String, ParamValue)>,
    headers: Vec<(String, String)>,
    body: Body,
    timeout: Option<Duration>,
}

impl Request {
    /// Start building a request. `target` is an absolute URL or a path
    /// resolved against the client's base URL at send time.
    pub fn builder(method: Method, target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, target)
    }

    pub fn get(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PUT, target)
    }

    pub fn patch(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PATCH, target)
    }

    pub fn delete(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::DELETE, target)
    }

    pub fn head(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::HEAD, target)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target without its query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn query(&self) -> &[(String, ParamValue)] {
        &self.query
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Per-request timeout overriding the client's total timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Serialized query string, `None` when there are no parameters.
    pub fn query_string(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.query {
            for v in value.values() {
                serializer.append_pair(key, v);
            }
        }
        Some(serializer.finish())
    }

    /// Resolve the target against `base` and attach the query string.
    pub fn url(&self, base: Option<&Url>) -> Result<Url> {
        let mut url = match Url::parse(&self.target) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match base {
                Some(base) => base.join(&self.target)?,
                None => return Err(url::ParseError::RelativeUrlWithoutBase.into()),
            },
            Err(e) => return Err(e.into()),
        };
        url.set_query(self.query_string().as_deref());
        Ok(url)
    }

    /// Encode the body for the wire. `Body::Empty` encodes to `None`.
    pub fn encode_body(&self) -> Result<Option<EncodedBody>> {
        let encoded = match &self.body {
            Body::Empty => return Ok(None),
            Body::Json(value) => EncodedBody {
                content_type: "application/json".to_string(),
                bytes: Bytes::from(serde_json::to_vec(value)?),
            },
            Body::Form(fields) => {
                let mut serializer = form_urlencoded::Serializer::new(String::new());
                for (name, value) in fields {
                    for v in value.values() {
                        serializer.append_pair(name, v);
                    }
                }
                EncodedBody {
                    content_type: "application/x-www-form-urlencoded".to_string(),
                    bytes: Bytes::from(serializer.finish()),
                }
            }
            Body::Multipart(parts) => {
                let boundary = multipart::generate_boundary(parts)?;
                EncodedBody {
                    content_type: multipart::content_type(&boundary),
                    bytes: multipart::encode(parts, &boundary),
                }
            }
        };
        Ok(Some(encoded))
    }

    /// Copy of this request with one header set.
    pub fn with_header(&self, name: &str, value: &str) -> Request {
        let mut request = self.clone();
        set_header(&mut request.headers, name, value);
        request
    }
}

/// Accumulates the parts of a [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let without_fragment = target.split('#').next().unwrap_or_default();
        let (path, inline_query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query)),
            None => (without_fragment.to_string(), None),
        };

        let mut query: Vec<(String, ParamValue)> = Vec::new();
        if let Some(inline) = inline_query {
            for (key, value) in form_urlencoded::parse(inline.as_bytes()) {
                match query.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => existing.push(value.into_owned()),
                    None => query.push((key.into_owned(), ParamValue::Single(value.into_owned()))),
                }
            }
        }

        Self {
            request: Request {
                method,
                target: path,
                query,
                headers: Vec::new(),
                body: Body::Empty,
                timeout: None,
            },
        }
    }

    /// Merge query parameters. Existing keys are replaced in place, new
    /// keys are appended.
    pub fn query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match self.request.query.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = value,
                None => self.request.query.push((key, value)),
            }
        }
        self
    }

    /// Set a header, replacing any value with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.request.headers, &name.into(), &value.into());
        self
    }

    /// Set `Authorization: Basic ...`.
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        self.header("Authorization", basic_auth(username, password))
    }

    /// Override the client's total timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Set a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.check_mode(BodyMode::Json)?;
        self.request.body = Body::Json(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Add a form field. Becomes a text part once the body is multipart.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(Error::invalid_part("form field name is empty"));
        }
        if matches!(self.request.body, Body::Empty) {
            self.request.body = Body::Form(Vec::new());
        }
        match &mut self.request.body {
            Body::Json(_) => {
                return Err(Error::ConflictingBodyMode {
                    active: BodyMode::Json,
                    requested: BodyMode::Form,
                })
            }
            Body::Multipart(parts) => {
                for v in value.values() {
                    parts.push(Part::text(name.clone(), v)?);
                }
            }
            Body::Form(fields) => fields.push((name, value)),
            Body::Empty => {}
        }
        Ok(self)
    }

    /// Attach a file from disk as a multipart part.
    pub fn attach(self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let part = Part::from_path(name, path)?;
        self.part(part)
    }

    /// Attach in-memory bytes as a multipart file part.
    pub fn attach_bytes(
        self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let part = Part::file(name, filename, content_type, data)?;
        self.part(part)
    }

    /// Add a prepared part, switching the body to multipart.
    pub fn part(mut self, part: Part) -> Result<Self> {
        self.check_mode(BodyMode::Multipart)?;
        let body = std::mem::replace(&mut self.request.body, Body::Empty);
        let mut parts = match body {
            Body::Multipart(parts) => parts,
            Body::Form(fields) => {
                let mut parts = Vec::new();
                for (name, value) in fields {
                    for v in value.values() {
                        parts.push(Part::text(name.clone(), v)?);
                    }
                }
                parts
            }
            Body::Empty | Body::Json(_) => Vec::new(),
        };
        parts.push(part);
        self.request.body = Body::Multipart(parts);
        Ok(self)
    }

    fn check_mode(&self, requested: BodyMode) -> Result<()> {
        let conflict = match (self.request.body.mode(), requested) {
            (None, _) => None,
            (Some(BodyMode::Json), BodyMode::Json) => None,
            (Some(BodyMode::Json), _) => Some(BodyMode::Json),
            (Some(active), BodyMode::Json) => Some(active),
            _ => None,
        };
        match conflict {
            Some(active) => Err(Error::ConflictingBodyMode { active, requested }),
            None => Ok(()),
        }
    }

    pub fn build(self) -> Request {
        self.request
    }
}
