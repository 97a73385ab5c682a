//! RFC 9110/9112 HTTP/1.1 client connection.
//!
//! Uses httparse for response parsing and raw I/O so the request bytes are
//! exactly what the caller built, in header order.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;
use url::{Position, Url};

use crate::error::{Error, Result, TransportError};
use crate::headers::{has_header, validate_header_name, validate_header_value};

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Largest single chunk accepted in a chunked body (16MB).
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Upper bound on body preallocation from a declared Content-Length.
const MAX_BODY_PREALLOC: usize = 64 * 1024;

/// Final response as read off the wire, before content decoding.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub version: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

fn protocol(message: impl Into<String>) -> Error {
    TransportError::protocol(message).into()
}

/// One HTTP/1.1 exchange over a stream.
pub struct H1Connection<S> {
    stream: S,
}

impl<S> H1Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Write the request and read the final response.
    pub async fn send_request(
        &mut self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Bytes>,
    ) -> Result<RawResponse> {
        let head = build_request(method, url, headers, body)?;
        self.stream
            .write_all(&head)
            .await
            .map_err(|e| protocol(format!("failed to write request: {}", e)))?;
        if let Some(body) = body {
            self.stream
                .write_all(body)
                .await
                .map_err(|e| protocol(format!("failed to write body: {}", e)))?;
        }
        self.stream
            .flush()
            .await
            .map_err(|e| protocol(format!("failed to flush: {}", e)))?;

        self.read_response(method).await
    }

    /// Read responses until a final (non-1xx) one arrives.
    async fn read_response(&mut self, method: &Method) -> Result<RawResponse> {
        // Bytes after an interim response may already hold the final one.
        let mut buffer = Vec::with_capacity(8192);

        loop {
            while find_header_end(&buffer).is_none() {
                if buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(protocol("response headers too large"));
                }
                if self.fill(&mut buffer).await? == 0 {
                    return Err(protocol("connection closed before response headers"));
                }
            }

            let (response, consumed) = self.parse_response(&buffer, method).await?;
            buffer.drain(..consumed.min(buffer.len()));

            if (100..200).contains(&response.status) {
                trace!(status = response.status, "skipping interim response");
                continue;
            }
            return Ok(response);
        }
    }

    /// Parse head and body, returning the response and the bytes consumed from `buffer`.
    async fn parse_response(
        &mut self,
        buffer: &[u8],
        method: &Method,
    ) -> Result<(RawResponse, usize)> {
        let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut parsed = httparse::Response::new(&mut header_slots);

        let headers_len = match parsed
            .parse(buffer)
            .map_err(|e| protocol(format!("failed to parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(protocol("incomplete response headers")),
        };

        let status = parsed
            .code
            .ok_or_else(|| protocol("missing status code"))?;
        let version = format!("HTTP/1.{}", parsed.version.unwrap_or(1));

        let mut headers = HeaderMap::new();
        for h in parsed.headers.iter().filter(|h| !h.name.is_empty()) {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| protocol(format!("invalid response header name {:?}", h.name)))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|_| protocol(format!("invalid value for response header {}", h.name)))?;
            headers.append(name, value);
        }

        // 1xx, 204, 304 and responses to HEAD carry no body.
        let has_body = !matches!(status, 100..=199 | 204 | 304) && *method != Method::HEAD;
        if !has_body {
            let raw = RawResponse {
                status,
                version,
                headers,
                body: Bytes::new(),
            };
            return Ok((raw, headers_len));
        }

        let transfer_encoding = header_str(&headers, "transfer-encoding");
        let is_chunked = transfer_encoding
            .map(|v| {
                v.split(',')
                    .next_back()
                    .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        // Transfer-Encoding overrides Content-Length.
        let content_length = match (transfer_encoding, header_str(&headers, "content-length")) {
            (None, Some(value)) => Some(parse_content_length(value)?),
            _ => None,
        };

        let body_start = &buffer[headers_len..];
        let (body, consumed) = if is_chunked {
            trace!("reading chunked body");
            (self.read_chunked_body(body_start.to_vec()).await?, buffer.len())
        } else if let Some(len) = content_length {
            trace!(content_length = len, "reading fixed-length body");
            let body = self.read_fixed_body(body_start, len).await?;
            (body, headers_len + body_start.len().min(len))
        } else {
            trace!("reading close-delimited body");
            (self.read_until_close(body_start).await?, buffer.len())
        };

        let raw = RawResponse {
            status,
            version,
            headers,
            body,
        };
        Ok((raw, consumed))
    }

    /// Read more bytes into `buffer`, returning how many arrived.
    async fn fill(&mut self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut read_buf = [0u8; 8192];
        let n = self
            .stream
            .read(&mut read_buf)
            .await
            .map_err(|e| protocol(format!("failed to read response: {}", e)))?;
        buffer.extend_from_slice(&read_buf[..n]);
        Ok(n)
    }

    async fn read_until_close(&mut self, initial: &[u8]) -> Result<Bytes> {
        let mut body = initial.to_vec();
        while self.fill(&mut body).await? > 0 {}
        Ok(Bytes::from(body))
    }

    /// A close before `content_length` bytes is an incomplete message.
    async fn read_fixed_body(&mut self, initial: &[u8], content_length: usize) -> Result<Bytes> {
        let mut body = Vec::with_capacity(content_length.min(MAX_BODY_PREALLOC));
        body.extend_from_slice(&initial[..initial.len().min(content_length)]);

        while body.len() < content_length {
            let remaining = content_length - body.len();
            let mut chunk = vec![0u8; remaining.min(8192)];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| protocol(format!("failed to read body: {}", e)))?;
            if n == 0 {
                return Err(protocol(format!(
                    "connection closed before full body (got {} of {} bytes)",
                    body.len(),
                    content_length
                )));
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Ok(Bytes::from(body))
    }

    /// chunked-body = *chunk last-chunk trailer-section CRLF
    async fn read_chunked_body(&mut self, initial: Vec<u8>) -> Result<Bytes> {
        let mut body = Vec::new();
        let mut buffer = initial;

        loop {
            let (chunk_size, line_end) = loop {
                if let Some(found) = find_chunk_size(&buffer) {
                    break found;
                }
                if find_crlf(&buffer).is_some() {
                    return Err(protocol("invalid chunk size line"));
                }
                if self.fill(&mut buffer).await? == 0 {
                    return Err(protocol("connection closed while reading chunk size"));
                }
            };
            buffer.drain(..line_end);

            if chunk_size == 0 {
                self.consume_trailers(&mut buffer).await?;
                break;
            }

            if chunk_size > MAX_CHUNK_SIZE {
                return Err(protocol(format!("chunk size too large: {}", chunk_size)));
            }
            let chunk_end = chunk_size
                .checked_add(2)
                .ok_or_else(|| protocol("chunk size too large"))?;
            while buffer.len() < chunk_end {
                if self.fill(&mut buffer).await? == 0 {
                    return Err(protocol("connection closed while reading chunk data"));
                }
            }
            if &buffer[chunk_size..chunk_end] != b"\r\n" {
                return Err(protocol("chunk data not terminated by CRLF"));
            }
            body.extend_from_slice(&buffer[..chunk_size]);
            buffer.drain(..chunk_end);
        }

        Ok(Bytes::from(body))
    }

    /// trailer-section = *( field-line CRLF ), ended by an empty line.
    async fn consume_trailers(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        loop {
            if let Some(pos) = find_crlf(buffer) {
                buffer.drain(..pos + 2);
                if pos == 0 {
                    return Ok(());
                }
                continue;
            }
            // A close here just means no trailers.
            if self.fill(buffer).await? == 0 {
                return Ok(());
            }
        }
    }
}

/// Serialize the request line and headers.
///
/// Always emits `Host` first, then caller headers in order, then
/// `Connection: close` and `Content-Length` unless the caller set them.
pub fn build_request(
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&Bytes>,
) -> Result<Vec<u8>> {
    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(name, value)?;
    }

    let mut request = Vec::with_capacity(1024);
    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    // origin-form: /path?query
    request.extend_from_slice(url[Position::BeforePath..Position::AfterQuery].as_bytes());
    request.extend_from_slice(b" HTTP/1.1\r\n");

    request.extend_from_slice(b"Host: ");
    request.extend_from_slice(url.host_str().unwrap_or_default().as_bytes());
    if let Some(port) = url.port() {
        request.extend_from_slice(format!(":{}", port).as_bytes());
    }
    request.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    if !has_header(headers, "connection") {
        request.extend_from_slice(b"Connection: close\r\n");
    }

    // Content-Length must not accompany Transfer-Encoding.
    if !has_header(headers, "transfer-encoding") && !has_header(headers, "content-length") {
        let length = match body {
            Some(body) => Some(body.len()),
            None if matches!(*method, Method::POST | Method::PUT | Method::PATCH) => Some(0),
            None => None,
        };
        if let Some(length) = length {
            request.extend_from_slice(format!("Content-Length: {}\r\n", length).as_bytes());
        }
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// Parse a chunk size line, returning (size, end_of_line_position).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    let i = find_crlf(buffer)?;
    let line = std::str::from_utf8(&buffer[..i]).ok()?;
    // Chunk extensions follow ';'.
    let size_part = line.split(';').next()?;
    let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
    Some((size, i + 2))
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Parse Content-Length; repeated values must be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let mut parts = value.split(',').map(|s| s.trim());
    let parse = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| protocol(format!("invalid Content-Length: {}", value)))
    };

    let first = parse(parts.next().unwrap_or_default())?;
    for part in parts {
        if parse(part)? != first {
            return Err(protocol(format!(
                "conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}
