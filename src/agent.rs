//! Cookie-persisting client session.

use std::borrow::Cow;

use tracing::trace;

use crate::client::Client;
use crate::cookie::{Cookie, CookieJar};
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// A [`Client`] paired with its own [`CookieJar`].
///
/// Every send attaches the jar's cookies for the target host and stores the
/// `Set-Cookie` headers of the reply. Sends take `&mut self`, so one agent
/// never has two exchanges in flight. Agents share no state with each other.
#[derive(Debug, Clone)]
pub struct Agent {
    client: Client,
    jar: CookieJar,
}

impl Agent {
    /// Agent with an empty jar.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            jar: CookieJar::new(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn cookies(&self) -> &[Cookie] {
        self.jar.cookies()
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.jar.get(name)
    }

    /// Send through the client with this agent's cookies.
    ///
    /// Jar cookies are appended to any `Cookie` header the request already
    /// carries. Redirects are returned as-is. A failed send leaves the jar
    /// untouched.
    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        let url = request.url(self.client.base_url())?;

        let outgoing = match self.jar.build_cookie_header(&url) {
            Some(jar_cookies) => {
                let merged = match request.header("Cookie") {
                    Some(existing) if !existing.trim().is_empty() => {
                        format!("{}; {}", existing, jar_cookies)
                    }
                    _ => jar_cookies,
                };
                trace!(cookie = %merged, "attaching cookies");
                Cow::Owned(request.with_header("Cookie", &merged))
            }
            None => Cow::Borrowed(request),
        };

        let response = self.client.send(&outgoing).await?;
        self.jar.store_from_response(&response);
        Ok(response)
    }
}

impl From<Client> for Agent {
    fn from(client: Client) -> Self {
        Self::new(client)
    }
}
