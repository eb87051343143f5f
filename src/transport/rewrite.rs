//! Request rewriting
//!
//! After an override, the TCP peer is an IP address but the server still
//! routes on the `Host` header. These helpers make sure the header (and the
//! authority of an absolute request URI) names the original hostname.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::HOST;
use http::uri::{Authority, PathAndQuery};
use http::{HeaderValue, Request, Uri};
use log::{debug, warn};

use super::connection::EstablishedConnection;
use super::request::Scheme;
use crate::common::format_authority;

/// Force the request's `Host` to `original_hostname`
///
/// Every existing `Host` value is removed and exactly one is set. The port
/// is appended only when it differs from the scheme's default port.
pub fn rewrite_headers<B>(mut request: Request<B>, original_hostname: &str, port: u16, scheme: Scheme) -> Request<B> {
    let authority = format_authority(original_hostname, port, scheme.default_port());

    let headers = request.headers_mut();
    headers.remove(HOST);
    match HeaderValue::from_str(&authority) {
        Ok(value) => {
            headers.insert(HOST, value);
        }
        Err(e) => warn!("Cannot use {} as a Host header: {}", authority, e),
    }

    if request.uri().authority().is_some() {
        if let Some(uri) = with_authority(request.uri(), &authority, scheme) {
            *request.uri_mut() = uri;
        }
    }

    debug!("Rewrote request Host to {}", authority);
    request
}

fn with_authority(uri: &Uri, authority: &str, scheme: Scheme) -> Option<Uri> {
    let authority: Authority = authority.parse().ok()?;
    let path = uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    let builder = match uri.scheme() {
        Some(s) => Uri::builder().scheme(s.clone()),
        None => Uri::builder().scheme(scheme.as_str()),
    };
    builder.authority(authority).path_and_query(path).build().ok()
}

/// Rewriter bound to one connection's identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRewriter {
    hostname: String,
    port: u16,
    scheme: Scheme,
}

impl RequestRewriter {
    pub fn new(hostname: &str, port: u16, scheme: Scheme) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            scheme,
        }
    }

    /// Rewriter for requests sent over `connection`
    pub fn for_connection(connection: &EstablishedConnection) -> Self {
        Self::new(connection.original_hostname(), connection.port(), connection.scheme())
    }

    /// Value the `Host` header will carry
    pub fn host_header(&self) -> String {
        format_authority(&self.hostname, self.port, self.scheme.default_port())
    }

    pub fn rewrite<B>(&self, request: Request<B>) -> Request<B> {
        rewrite_headers(request, &self.hostname, self.port, self.scheme)
    }
}

/// Serialize an HTTP/1.1 request head in origin form
///
/// The body is not included. Header values are written as-is.
pub fn encode_request_head<B>(request: &Request<B>) -> Bytes {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut head = BytesMut::with_capacity(256);
    head.put_slice(request.method().as_str().as_bytes());
    head.put_u8(b' ');
    head.put_slice(target.as_bytes());
    head.put_slice(b" HTTP/1.1\r\n");

    for (name, value) in request.headers() {
        head.put_slice(name.as_str().as_bytes());
        head.put_slice(b": ");
        head.put_slice(value.as_bytes());
        head.put_slice(b"\r\n");
    }
    head.put_slice(b"\r\n");

    head.freeze()
}
