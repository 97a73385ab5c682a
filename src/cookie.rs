//! Per-agent cookie storage.
//!
//! Cookies are keyed by name: a later `Set-Cookie` for the same name replaces
//! the value in place, so the `Cookie` header keeps first-seen order.

use std::fmt;

use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::response::Response;

/// Cookie as stored in the jar.
///
/// Only `Path` and `Domain` are kept from the attributes; expiry, `Secure`
/// and the rest are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
        }
    }

    /// Parse a `Set-Cookie` value received in response to `request_url`.
    pub fn from_set_cookie_header(header: &str, request_url: &Url) -> Result<Self> {
        let request_domain = request_url
            .host_str()
            .ok_or_else(|| Error::CookieParse("no host in request URL".to_string()))?;

        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts
            .next()
            .and_then(|pair| pair.split_once('='))
            .ok_or_else(|| Error::CookieParse(format!("no '=' in {:?}", header)))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::CookieParse(format!("empty cookie name in {:?}", header)));
        }

        let mut cookie = Cookie::new(name, value.trim(), request_domain);
        for attr in parts {
            if let Some((key, val)) = attr.split_once('=') {
                let val = val.trim();
                match key.trim().to_ascii_lowercase().as_str() {
                    "domain" if !val.is_empty() => cookie.domain = normalize_domain(val),
                    "path" if val.starts_with('/') => cookie.path = val.to_string(),
                    _ => {}
                }
            }
        }
        Ok(cookie)
    }

    /// Host equals the cookie domain or is a subdomain of it.
    pub fn domain_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Insertion-ordered cookie jar owned by a single agent.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie; an existing cookie with the same name is replaced in place.
    pub fn store(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// Store every `Set-Cookie` of a response. Malformed headers are skipped.
    pub fn store_from_response(&mut self, response: &Response) {
        for header in response.set_cookies() {
            match Cookie::from_set_cookie_header(header, response.url()) {
                Ok(cookie) => {
                    debug!(name = %cookie.name, domain = %cookie.domain, "storing cookie");
                    self.store(cookie);
                }
                Err(e) => warn!(header, error = %e, "skipping malformed Set-Cookie"),
            }
        }
    }

    /// Cookies that apply to `url`, in first-seen order.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<&Cookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        self.cookies.iter().filter(|c| c.domain_matches(host)).collect()
    }

    /// `Cookie` header value for `url`, or `None` when nothing applies.
    pub fn build_cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn remove(&mut self, name: &str) -> Option<Cookie> {
        let pos = self.cookies.iter().position(|c| c.name == name)?;
        Some(self.cookies.remove(pos))
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_prefix('.').unwrap_or(domain).to_ascii_lowercase()
}
