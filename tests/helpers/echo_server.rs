//! Local stand-in for a public echo service.
//!
//! Speaks just enough HTTP/1.1 for the harness: one request per connection,
//! `Content-Length` request bodies, `Connection: close` replies.
//!
//! Routes:
//! - `/get`, `/post`, `/put`, `/patch`, `/delete`: echo `args`, `headers`,
//!   `url` and, for methods with a body, `data`, `form`, `files`, `json`
//! - `/gzip`: echo gzip-compressed when the client accepts gzip
//! - `/headers`, `/ping`
//! - `/cookies/set?k=v`: 302 to `/cookies` with one `Set-Cookie` per pair
//! - `/cookies`: cookies the client sent
//! - `/basic-auth`: `postman:password`
//! - `/status/{code}`, `/delay/{ms}`, `/malformed-json`, `/bad-gzip`,
//!   `/chunked`, `/latin1`

use std::io::Write;
use std::time::Duration;

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::form_urlencoded;

pub const USERNAME: &str = "postman";
pub const PASSWORD: &str = "password";

const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Echo server bound to a random local port.
pub struct EchoServer {
    listener: TcpListener,
    port: u16,
}

impl EchoServer {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    #[allow(dead_code)]
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Accept connections in a background task until the runtime shuts down.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream));
                    }
                    Err(e) => {
                        tracing::error!("accept error: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

/// Start a server and return its base URL.
pub async fn spawn() -> String {
    let server = EchoServer::new().await.expect("bind echo server");
    let url = server.url();
    server.start();
    url
}

struct EchoRequest {
    method: String,
    target: String,
    /// Names lowercased, in received order.
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl EchoRequest {
    fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn url(&self) -> String {
        format!("http://{}{}", self.header("host").unwrap_or_default(), self.target)
    }
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    chunked: bool,
}

impl Reply {
    fn new(status: u16) -> Self {
        Self {
            status,
            headers: vec![("Server".to_string(), "wiretest-echo".to_string())],
            body: Vec::new(),
            chunked: false,
        }
    }

    fn json(status: u16, value: &Value) -> Self {
        Self::new(status)
            .header("Content-Type", JSON_UTF8)
            .body(value.to_string())
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn into_bytes(self) -> Vec<u8> {
        let reason = http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"Connection: close\r\n");
        if self.chunked {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            for chunk in self.body.chunks(7) {
                out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                out.extend_from_slice(chunk);
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"0\r\n\r\n");
        } else {
            out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
            out.extend_from_slice(&self.body);
        }
        out
    }
}

async fn handle_connection(mut stream: TcpStream) {
    let request = match read_request(&mut stream).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("bad request: {}", e);
            let _ = stream.write_all(&Reply::new(400).into_bytes()).await;
            return;
        }
    };

    let reply = route(&request).await;
    // The client may have given up already (timeouts).
    let _ = stream.write_all(&reply.into_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Result<Option<EchoRequest>, String> {
    let mut buffer = Vec::new();
    let mut read_buf = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut read_buf).await.map_err(|e| e.to_string())?;
        if n == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&read_buf[..n]);
    };

    let mut header_slots = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Request::new(&mut header_slots);
    parsed.parse(&buffer[..header_end]).map_err(|e| e.to_string())?;

    let method = parsed.method.unwrap_or("GET").to_string();
    let target = parsed.path.unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut read_buf).await.map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("connection closed mid-body".to_string());
        }
        body.extend_from_slice(&read_buf[..n]);
    }
    body.truncate(content_length);

    Ok(Some(EchoRequest {
        method,
        target,
        headers,
        body,
    }))
}

async fn route(request: &EchoRequest) -> Reply {
    let path = request.path().to_string();
    let method_path = format!("/{}", request.method.to_ascii_lowercase());

    match path.as_str() {
        p if p == method_path && request.method != "HEAD" => Reply::json(200, &echo(request)),
        "/gzip" => gzip_echo(request),
        "/headers" => Reply::json(200, &json!({ "headers": headers_json(request) })),
        "/ping" => Reply::json(200, &json!({ "pong": true })),
        "/cookies" => Reply::json(200, &json!({ "cookies": cookies_json(request) })),
        "/cookies/set" => set_cookies(request),
        "/basic-auth" => basic_auth(request),
        "/malformed-json" => Reply::new(200)
            .header("Content-Type", JSON_UTF8)
            .body(r#"{"truncated": "#),
        "/bad-gzip" => Reply::new(200)
            .header("Content-Type", JSON_UTF8)
            .header("Content-Encoding", "gzip")
            .body("this is not gzip data"),
        "/chunked" => {
            let mut reply = Reply::json(200, &echo(request));
            reply.chunked = true;
            reply
        }
        "/latin1" => Reply::new(200)
            .header("Content-Type", "text/plain; charset=iso-8859-1")
            .body(vec![b'c', b'a', b'f', 0xe9]),
        p if p.starts_with("/status/") => match p["/status/".len()..].parse::<u16>() {
            Ok(code) if (200..600).contains(&code) => {
                Reply::json(code, &json!({ "status": code }))
            }
            _ => Reply::new(400).body("Bad Request"),
        },
        p if p.starts_with("/delay/") => match p["/delay/".len()..].parse::<u64>() {
            Ok(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Reply::json(200, &json!({ "delay": ms }))
            }
            Err(_) => Reply::new(400).body("Bad Request"),
        },
        "/" if request.method == "HEAD" => Reply::new(200)
            .header("Content-Type", JSON_UTF8)
            .header("X-Head", "yes"),
        _ => Reply::new(404).body("Not Found"),
    }
}

fn echo(request: &EchoRequest) -> Value {
    let mut out = Map::new();
    out.insert("args".into(), Value::Object(group_pairs(query_pairs(request.query()))));
    out.insert("headers".into(), headers_json(request));
    out.insert("url".into(), Value::String(request.url()));

    if request.method == "GET" {
        return Value::Object(out);
    }

    let content_type = request.header("content-type").unwrap_or_default();
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    let (data, form, files, parsed_json) = match essence {
        "application/json" => {
            match serde_json::from_slice::<Value>(&request.body) {
                Ok(value) => (value.clone(), Map::new(), Map::new(), value),
                Err(_) => (lossy(&request.body), Map::new(), Map::new(), Value::Null),
            }
        }
        "application/x-www-form-urlencoded" => (
            Value::String(String::new()),
            group_pairs(query_pairs(&String::from_utf8_lossy(&request.body))),
            Map::new(),
            Value::Null,
        ),
        "multipart/form-data" => {
            let (form, files) = parse_multipart(content_type, &request.body);
            (Value::Object(Map::new()), form, files, Value::Null)
        }
        _ => (lossy(&request.body), Map::new(), Map::new(), Value::Null),
    };

    out.insert("data".into(), data);
    out.insert("form".into(), Value::Object(form));
    out.insert("files".into(), Value::Object(files));
    out.insert("json".into(), parsed_json);
    Value::Object(out)
}

fn gzip_echo(request: &EchoRequest) -> Reply {
    let accepts_gzip = request
        .header("accept-encoding")
        .map(|v| v.split(',').any(|e| e.trim().eq_ignore_ascii_case("gzip")))
        .unwrap_or(false);
    let body = json!({
        "gzipped": accepts_gzip,
        "headers": headers_json(request),
        "method": request.method,
    })
    .to_string();

    if !accepts_gzip {
        return Reply::new(200).header("Content-Type", JSON_UTF8).body(body);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes()).expect("gzip in memory");
    let compressed = encoder.finish().expect("gzip in memory");
    Reply::new(200)
        .header("Content-Type", JSON_UTF8)
        .header("Content-Encoding", "gzip")
        .body(compressed)
}

fn set_cookies(request: &EchoRequest) -> Reply {
    let mut reply = Reply::new(302)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Location", "/cookies");
    for (name, value) in query_pairs(request.query()) {
        reply = reply.header("Set-Cookie", &format!("{}={}; Path=/", name, value));
    }
    reply.body("Found. Redirecting to /cookies")
}

fn basic_auth(request: &EchoRequest) -> Reply {
    let expected = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", USERNAME, PASSWORD))
    );
    match request.header("authorization") {
        Some(value) if value == expected => {
            Reply::json(200, &json!({ "authenticated": true }))
        }
        _ => Reply::new(401).body("Unauthorized"),
    }
}

fn headers_json(request: &EchoRequest) -> Value {
    let mut map = Map::new();
    for (name, value) in &request.headers {
        let merged = match map.get(name).and_then(Value::as_str) {
            Some(existing) => format!("{}, {}", existing, value),
            None => value.clone(),
        };
        map.insert(name.clone(), Value::String(merged));
    }
    Value::Object(map)
}

fn cookies_json(request: &EchoRequest) -> Value {
    let mut map = Map::new();
    if let Some(header) = request.header("cookie") {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                map.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
    }
    Value::Object(map)
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Repeated keys become arrays in arrival order.
fn group_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}

fn lossy(body: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(body).into_owned())
}

/// Split a multipart body into text fields and files keyed by filename.
fn parse_multipart(content_type: &str, body: &[u8]) -> (Map<String, Value>, Map<String, Value>) {
    let mut fields = Vec::new();
    let mut files = Map::new();

    let Some(boundary) = content_type
        .split(';')
        .find_map(|p| p.trim().strip_prefix("boundary="))
    else {
        return (Map::new(), files);
    };
    let delimiter = format!("--{}", boundary).into_bytes();

    for section in split_on(body, &delimiter).into_iter().skip(1) {
        if section.starts_with(b"--") {
            break;
        }
        let section = section.strip_prefix(b"\r\n").unwrap_or(section);
        let section = section.strip_suffix(b"\r\n").unwrap_or(section);
        let Some(split) = section.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&section[..split]);
        let content = &section[split + 4..];

        let disposition = head
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))
            .unwrap_or_default();
        let part_type = head
            .lines()
            .find_map(|l| {
                l.split_once(':')
                    .filter(|(k, _)| k.trim().eq_ignore_ascii_case("content-type"))
                    .map(|(_, v)| v.trim().to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        match (param(disposition, "name"), param(disposition, "filename")) {
            (_, Some(filename)) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(content);
                files.insert(
                    filename,
                    Value::String(format!("data:{};base64,{}", part_type, encoded)),
                );
            }
            (Some(name), None) => {
                fields.push((name, String::from_utf8_lossy(content).into_owned()));
            }
            (None, None) => {}
        }
    }

    (group_pairs(fields), files)
}

fn param(disposition: &str, key: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|p| {
        let (k, v) = p.trim().split_once('=')?;
        (k == key).then(|| v.trim_matches('"').to_string())
    })
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            pieces.push(&haystack[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    pieces.push(&haystack[start..]);
    pieces
}
