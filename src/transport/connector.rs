//! TCP connector with optional BoringSSL TLS.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use url::{Host, Url};

use crate::error::TransportError;

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    /// Plain TCP stream for HTTP.
    Http(TcpStream),
    /// TLS-wrapped stream for HTTPS.
    #[cfg(feature = "tls")]
    Https(tokio_boring::SslStream<TcpStream>),
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Opens connections for the transport.
#[derive(Debug, Clone, Default)]
pub struct Connector {
    connect_timeout: Option<Duration>,
    #[cfg(feature = "tls")]
    root_certs: Vec<Vec<u8>>,
}

impl Connector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            #[cfg(feature = "tls")]
            root_certs: Vec::new(),
        }
    }

    /// Add custom root certificates (DER or PEM).
    #[cfg(feature = "tls")]
    pub fn with_root_certificates(mut self, certs: Vec<Vec<u8>>) -> Self {
        self.root_certs = certs;
        self
    }

    /// Connect to the host of `url`, returning either a plain TCP or TLS stream.
    pub async fn connect(&self, url: &Url) -> Result<MaybeHttpsStream, TransportError> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(TransportError::unreachable(format!("no host in {}", url))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::unreachable(format!("no port for {}", url)))?;

        let connect = TcpStream::connect((host.as_str(), port));
        let tcp_stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                TransportError::timeout(format!("connect to {}:{} exceeded {:?}", host, port, limit))
            })?,
            None => connect.await,
        }
        .map_err(|e| {
            TransportError::unreachable(format!("failed to connect to {}:{}: {}", host, port, e))
        })?;

        match url.scheme() {
            "http" => Ok(MaybeHttpsStream::Http(tcp_stream)),
            "https" => self.handshake(&host, tcp_stream).await,
            other => Err(TransportError::unreachable(format!(
                "unsupported scheme {:?}",
                other
            ))),
        }
    }

    #[cfg(feature = "tls")]
    async fn handshake(
        &self,
        host: &str,
        tcp_stream: TcpStream,
    ) -> Result<MaybeHttpsStream, TransportError> {
        use boring::ssl::{SslConnector, SslMethod, SslVersion};
        use boring::x509::X509;

        let tls_err = |what: &str, e: &dyn std::fmt::Display| {
            TransportError::unreachable(format!("TLS {}: {}", what, e))
        };

        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| tls_err("connector", &e))?;
        for cert_bytes in &self.root_certs {
            let cert = X509::from_der(cert_bytes)
                .or_else(|_| X509::from_pem(cert_bytes))
                .map_err(|e| tls_err("root certificate", &e))?;
            builder
                .cert_store_mut()
                .add_cert(cert)
                .map_err(|e| tls_err("root certificate", &e))?;
        }
        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| tls_err("min version", &e))?;
        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|e| tls_err("ALPN", &e))?;

        let config = builder
            .build()
            .configure()
            .map_err(|e| tls_err("configure", &e))?;
        let ssl_stream = tokio_boring::connect(config, host, tcp_stream)
            .await
            .map_err(|e| tls_err("handshake", &e))?;
        Ok(MaybeHttpsStream::Https(ssl_stream))
    }

    #[cfg(not(feature = "tls"))]
    async fn handshake(
        &self,
        host: &str,
        _tcp_stream: TcpStream,
    ) -> Result<MaybeHttpsStream, TransportError> {
        Err(TransportError::unreachable(format!(
            "https://{} requires the `tls` feature",
            host
        )))
    }
}
