//! HTTP/1.1 client: one connection per request, no pooling.

use std::time::Duration;

use http::Method;
use tracing::debug;
use url::Url;

use crate::agent::Agent;
use crate::error::{Error, Result, TransportError};
use crate::headers::{
    default_headers, set_default, set_header, validate_header_name, validate_header_value,
};
use crate::request::{EncodedBody, Request};
use crate::response::Response;
use crate::timeouts::Timeouts;
use crate::transport::connector::Connector;
use crate::transport::h1::{H1Connection, RawResponse};

/// Sends [`Request`]s and turns the replies into [`Response`]s.
///
/// Cloning is cheap enough to hand a copy to each [`Agent`].
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Option<Url>,
    timeouts: Timeouts,
    default_headers: Vec<(String, String)>,
    connector: Connector,
}

/// Builder for creating clients.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeouts: Timeouts,
    default_headers: Vec<(String, String)>,
    #[cfg(feature = "tls")]
    root_certs: Vec<Vec<u8>>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Base URL that relative request targets resolve against.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Headers added to every request that does not set them itself.
    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    /// New agent with its own empty cookie jar.
    pub fn agent(&self) -> Agent {
        Agent::new(self.clone())
    }

    /// Send a request and wait for the full response.
    ///
    /// Any status code is a successful send; only transport problems,
    /// undecodable bodies and invalid requests are errors.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let url = request.url(self.base_url.as_ref())?;
        let body = request.encode_body()?;
        let headers = self.prepare_headers(request, body.as_ref());
        let method = request.method();

        debug!(%method, %url, "sending request");

        let exchange = self.execute(method, &url, &headers, body.as_ref());
        let raw = match self.timeouts.effective_total(request.timeout()) {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                TransportError::timeout(format!("{} {} exceeded {:?}", method, url, limit))
            })??,
            None => exchange.await?,
        };

        let version = raw.version;
        let response =
            Response::from_parts(raw.status, raw.headers, raw.body, url)?.with_http_version(version);
        debug!(
            status = response.status(),
            body_len = response.body().len(),
            "received response"
        );
        Ok(response)
    }

    async fn execute(
        &self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&EncodedBody>,
    ) -> Result<RawResponse> {
        let stream = self.connector.connect(url).await?;
        let mut conn = H1Connection::new(stream);
        conn.send_request(method, url, headers, body.map(|b| &b.bytes))
            .await
    }

    /// Caller headers first, then client defaults and the body content type
    /// for anything the caller left unset.
    fn prepare_headers(
        &self,
        request: &Request,
        body: Option<&EncodedBody>,
    ) -> Vec<(String, String)> {
        let mut headers = request.headers().to_vec();
        for (name, value) in &self.default_headers {
            set_default(&mut headers, name, value);
        }
        if let Some(body) = body {
            set_default(&mut headers, "Content-Type", &body.content_type);
        }
        headers
    }
}

impl Default for Client {
    fn default() -> Self {
        Self {
            base_url: None,
            timeouts: Timeouts::api_defaults(),
            default_headers: default_headers(),
            connector: Connector::new(Timeouts::api_defaults().connect),
        }
    }
}

impl ClientBuilder {
    /// Builder with [`Timeouts::api_defaults`] and the standard headers.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeouts: Timeouts::api_defaults(),
            default_headers: default_headers(),
            #[cfg(feature = "tls")]
            root_certs: Vec::new(),
        }
    }

    /// Resolve relative request targets against this URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = Some(timeout);
        self
    }

    /// Set the total per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.total = Some(timeout);
        self
    }

    /// Add or replace a header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.default_headers, &name.into(), &value.into());
        self
    }

    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.default_header("User-Agent", user_agent)
    }

    /// Override the default `Accept-Encoding: gzip`.
    pub fn accept_encoding(self, encoding: impl Into<String>) -> Self {
        self.default_header("Accept-Encoding", encoding)
    }

    /// Trust an extra root certificate (DER or PEM).
    #[cfg(feature = "tls")]
    pub fn root_certificate(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.root_certs.push(cert.into());
        self
    }

    pub fn build(self) -> Result<Client> {
        let base_url = match self.base_url {
            Some(raw) => {
                let url = Url::parse(&raw)?;
                if url.cannot_be_a_base() {
                    return Err(Error::InvalidUrl(url::ParseError::RelativeUrlWithoutBase));
                }
                Some(url)
            }
            None => None,
        };

        for (name, value) in &self.default_headers {
            validate_header_name(name)?;
            validate_header_value(name, value)?;
        }

        let connector = Connector::new(self.timeouts.connect);
        #[cfg(feature = "tls")]
        let connector = connector.with_root_certificates(self.root_certs);

        Ok(Client {
            base_url,
            timeouts: self.timeouts,
            default_headers: self.default_headers,
            connector,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
