//! HTTP/1.1 transport over plain TCP or BoringSSL TLS.

pub mod connector;
pub mod h1;
