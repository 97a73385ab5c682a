//! HTTP response record with transparent decompression and JSON parsing.

use std::io::Read;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::HeaderMap;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result, TransportError};

/// Response as seen by the caller: body already decoded, JSON already parsed.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    json: Option<Value>,
    http_version: String,
    url: Url,
}

impl Response {
    /// Build a response from wire parts.
    ///
    /// Decodes `Content-Encoding` and, when the content type is JSON, parses
    /// the body with the declared charset.
    pub fn from_parts(
        status: u16,
        headers: HeaderMap,
        body: impl Into<Bytes>,
        url: Url,
    ) -> std::result::Result<Self, TransportError> {
        let body = decode_content(&headers, body.into())?;

        let json = match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            Some(ct) if is_json_content_type(ct) && !body.is_empty() => {
                let text = decode_text(&body, charset_of(ct).as_deref())?;
                let value = serde_json::from_str(&text).map_err(|e| {
                    TransportError::malformed_body(format!("invalid JSON body: {}", e))
                })?;
                Some(value)
            }
            _ => None,
        };

        Ok(Self {
            status,
            headers,
            body,
            json,
            http_version: "HTTP/1.1".to_string(),
            url,
        })
    }

    pub(crate) fn with_http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = version.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// URL the request was sent to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a header, in received order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.header(CONTENT_ENCODING.as_str())
    }

    /// Charset parameter of `Content-Type`, lowercased.
    pub fn charset(&self) -> Option<String> {
        self.content_type().and_then(charset_of)
    }

    pub fn set_cookies(&self) -> Vec<&str> {
        self.header_all(SET_COOKIE.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Decoded body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text using the declared charset (utf-8 when none).
    pub fn text(&self) -> Result<String> {
        Ok(decode_text(&self.body, self.charset().as_deref())?)
    }

    /// Parsed JSON body, present when the content type declared JSON.
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Deserialize the JSON body into a typed value.
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match &self.json {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Err(Error::from(TransportError::malformed_body(
                "response has no JSON body",
            ))),
        }
    }
}

/// True if the content type denotes JSON.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.contains("application/json") || essence.ends_with("+json")
}

/// Extract the `charset` parameter of a content type.
pub fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Decode text in one of the supported charsets.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> std::result::Result<String, TransportError> {
    match charset.unwrap_or("utf-8") {
        "utf-8" | "utf8" => String::from_utf8(bytes.to_vec())
            .map_err(|e| TransportError::malformed_body(format!("UTF-8 decode error: {}", e))),
        "us-ascii" | "ascii" => {
            if bytes.is_ascii() {
                Ok(bytes.iter().map(|&b| b as char).collect())
            } else {
                Err(TransportError::malformed_body("non-ASCII byte in us-ascii body"))
            }
        }
        "iso-8859-1" | "latin1" | "latin-1" => Ok(bytes.iter().map(|&b| b as char).collect()),
        other => Err(TransportError::decode_failure(format!(
            "unsupported charset {:?}",
            other
        ))),
    }
}

/// Decode body based on Content-Encoding (gzip, deflate, identity).
pub fn decode_content(headers: &HeaderMap, body: Bytes) -> std::result::Result<Bytes, TransportError> {
    let encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_ascii_lowercase());

    match encoding.as_deref() {
        None | Some("") | Some("identity") => Ok(body),
        // HEAD/204/304 responses may declare an encoding without carrying a body.
        Some(_) if body.is_empty() => Ok(body),
        Some("gzip") | Some("x-gzip") => decode_gzip(&body),
        Some("deflate") => decode_deflate(&body),
        Some(other) => Err(TransportError::decode_failure(format!(
            "unsupported content-encoding {:?}",
            other
        ))),
    }
}

fn decode_gzip(data: &[u8]) -> std::result::Result<Bytes, TransportError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| TransportError::decode_failure(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_deflate(data: &[u8]) -> std::result::Result<Bytes, TransportError> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| TransportError::decode_failure(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}
