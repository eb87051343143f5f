//! Connection requests
//!
//! A [`ConnectionRequest`] names the host the caller wants to talk to. The
//! hostname it carries is the connection's identity: it is what SNI,
//! certificate verification and the `Host` header use, whichever address
//! ends up being dialed.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use http::header::HOST;
use http::uri::Authority;
use http::{Request, Uri};

use crate::config::ConfigError;
use crate::rules::{normalize_hostname, HostPattern};
use crate::tls::Fingerprint;

/// Whether the connection is wrapped in TLS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain TCP (`http`)
    Plain,
    /// TLS over TCP (`https`)
    Tls,
}

impl Scheme {
    /// Port used when a URI or `Host` value does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Plain => 80,
            Scheme::Tls => 443,
        }
    }

    /// Whether this scheme uses TLS
    pub fn is_tls(self) -> bool {
        matches!(self, Scheme::Tls)
    }

    /// URI scheme name
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Plain => "http",
            Scheme::Tls => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "ws" => Ok(Scheme::Plain),
            "https" | "wss" => Ok(Scheme::Tls),
            other => Err(ConfigError::InvalidValue {
                name: "scheme".to_string(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

/// A request for an outbound connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    hostname: String,
    port: u16,
    scheme: Scheme,
    pinned_fingerprint: Option<Fingerprint>,
    insecure_skip_chain_verification: bool,
    address_hint: Option<SocketAddr>,
}

impl ConnectionRequest {
    /// Request a connection to `hostname:port`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHostname` if `hostname` is not a valid
    /// hostname or IP literal, or `ConfigError::InvalidValue` for port 0.
    pub fn new(hostname: &str, port: u16, scheme: Scheme) -> Result<Self, ConfigError> {
        let hostname = match HostPattern::parse(hostname)? {
            HostPattern::Exact(name) => name,
            HostPattern::Wildcard { .. } => {
                return Err(ConfigError::InvalidHostname {
                    value: hostname.to_string(),
                    reason: "a connection needs a concrete hostname".to_string(),
                });
            }
        };

        if port == 0 {
            return Err(ConfigError::InvalidValue {
                name: "port".to_string(),
                reason: "port must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            hostname,
            port,
            scheme,
            pinned_fingerprint: None,
            insecure_skip_chain_verification: false,
            address_hint: None,
        })
    }

    /// TLS connection to `hostname:port`
    pub fn tls(hostname: &str, port: u16) -> Result<Self, ConfigError> {
        Self::new(hostname, port, Scheme::Tls)
    }

    /// Plain TCP connection to `hostname:port`
    pub fn plain(hostname: &str, port: u16) -> Result<Self, ConfigError> {
        Self::new(hostname, port, Scheme::Plain)
    }

    /// Request for the host addressed by an absolute URI
    pub fn from_uri(uri: &Uri) -> Result<Self, ConfigError> {
        let scheme: Scheme = uri
            .scheme_str()
            .ok_or_else(|| invalid_uri(uri, "missing scheme"))?
            .parse()?;
        let host = uri.host().ok_or_else(|| invalid_uri(uri, "missing host"))?;
        let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());

        Self::new(host, port, scheme)
    }

    /// Request for the host an HTTP request is addressed to
    ///
    /// When the URI addresses a literal IP but the `Host` header names a
    /// hostname, the hostname becomes the connection identity and the URI's
    /// IP and port become the address hint. The identity port then comes from
    /// the `Host` header, or the scheme default when it names none. An
    /// origin-form URI (`/path`) takes host and port from the `Host` header
    /// and assumes TLS.
    pub fn from_http_request<B>(request: &Request<B>) -> Result<Self, ConfigError> {
        let host_header = match request.headers().get(HOST) {
            Some(value) => {
                let value = value.to_str().map_err(|_| ConfigError::InvalidValue {
                    name: "Host".to_string(),
                    reason: "header is not valid ASCII".to_string(),
                })?;
                Some(Authority::from_str(value.trim()).map_err(|e| ConfigError::InvalidValue {
                    name: "Host".to_string(),
                    reason: e.to_string(),
                })?)
            }
            None => None,
        };

        let uri = request.uri();
        if uri.authority().is_none() {
            let authority = host_header.ok_or_else(|| invalid_uri(uri, "no host in URI or Host header"))?;
            let scheme = match uri.scheme_str() {
                Some(s) => s.parse()?,
                None => Scheme::Tls,
            };
            let port = authority.port_u16().unwrap_or_else(|| scheme.default_port());
            return Self::new(authority.host(), port, scheme);
        }

        let target = Self::from_uri(uri)?;
        let ip = match target.hostname.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => return Ok(target),
        };

        match host_header {
            Some(authority) if normalize_hostname(authority.host()).parse::<IpAddr>().is_err() => {
                let port = authority.port_u16().unwrap_or_else(|| target.scheme.default_port());
                let named = Self::new(authority.host(), port, target.scheme)?;
                Ok(named.with_address_hint(SocketAddr::new(ip, target.port)))
            }
            _ => Ok(target),
        }
    }

    /// Require the peer's leaf certificate to have this fingerprint
    pub fn with_pinned_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.pinned_fingerprint = Some(fingerprint);
        self
    }

    /// Skip chain-trust verification; rejected unless a fingerprint is pinned
    pub fn with_insecure_skip_chain_verification(mut self, skip: bool) -> Self {
        self.insecure_skip_chain_verification = skip;
        self
    }

    /// Dial this address instead of consulting the rule table
    ///
    /// The hint's port is the port dialed; `port()` stays the identity port
    /// used for the `Host` header.
    pub fn with_address_hint(mut self, address: SocketAddr) -> Self {
        self.address_hint = Some(address);
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn pinned_fingerprint(&self) -> Option<Fingerprint> {
        self.pinned_fingerprint
    }

    pub fn insecure_skip_chain_verification(&self) -> bool {
        self.insecure_skip_chain_verification
    }

    pub fn address_hint(&self) -> Option<SocketAddr> {
        self.address_hint
    }
}

impl fmt::Display for ConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}",
            self.scheme,
            crate::common::format_authority(&self.hostname, self.port, self.scheme.default_port())
        )
    }
}

fn invalid_uri(uri: &Uri, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: "uri".to_string(),
        reason: format!("{}: {}", uri, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_hostname() {
        let request = ConnectionRequest::tls("Example.ORG.", 443).unwrap();
        assert_eq!(request.hostname(), "example.org");
        assert_eq!(request.scheme(), Scheme::Tls);
        assert!(request.address_hint().is_none());
        assert_eq!(request.to_string(), "https://example.org");
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(ConnectionRequest::tls("*.example.org", 443).is_err());
        assert!(ConnectionRequest::tls("bad host", 443).is_err());
        assert!(ConnectionRequest::tls("example.org", 0).is_err());
    }

    #[test]
    fn test_from_uri() {
        let uri: Uri = "https://example.org/get".parse().unwrap();
        let request = ConnectionRequest::from_uri(&uri).unwrap();
        assert_eq!(request.port(), 443);

        let uri: Uri = "http://example.org:8080/".parse().unwrap();
        let request = ConnectionRequest::from_uri(&uri).unwrap();
        assert_eq!(request.scheme(), Scheme::Plain);
        assert_eq!(request.port(), 8080);

        let uri: Uri = "https://[::1]:8443/".parse().unwrap();
        let request = ConnectionRequest::from_uri(&uri).unwrap();
        assert_eq!(request.hostname(), "::1");

        let uri: Uri = "ftp://example.org/".parse().unwrap();
        assert!(ConnectionRequest::from_uri(&uri).is_err());
    }

    #[test]
    fn test_identity_from_host_header() {
        let request = Request::get("https://122.228.95.175/get")
            .header(HOST, "httpbin.example")
            .body(())
            .unwrap();
        let target = ConnectionRequest::from_http_request(&request).unwrap();

        assert_eq!(target.hostname(), "httpbin.example");
        assert_eq!(target.port(), 443);
        assert_eq!(target.address_hint(), Some("122.228.95.175:443".parse().unwrap()));
    }

    #[test]
    fn test_uri_port_is_dialed_not_named() {
        let request = Request::get("https://127.0.0.1:8443/get")
            .header(HOST, "httpbin.example")
            .body(())
            .unwrap();
        let target = ConnectionRequest::from_http_request(&request).unwrap();
        assert_eq!(target.port(), 443);
        assert_eq!(target.address_hint(), Some("127.0.0.1:8443".parse().unwrap()));
        assert_eq!(target.to_string(), "https://httpbin.example");

        let request = Request::get("https://127.0.0.1:8443/get")
            .header(HOST, "httpbin.example:9000")
            .body(())
            .unwrap();
        let target = ConnectionRequest::from_http_request(&request).unwrap();
        assert_eq!(target.port(), 9000);
        assert_eq!(target.address_hint(), Some("127.0.0.1:8443".parse().unwrap()));
    }

    #[test]
    fn test_host_header_ignored_for_named_uri() {
        let request = Request::get("https://example.org/get")
            .header(HOST, "other.example")
            .body(())
            .unwrap();
        let target = ConnectionRequest::from_http_request(&request).unwrap();

        assert_eq!(target.hostname(), "example.org");
        assert!(target.address_hint().is_none());
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let request = Request::get("/get")
            .header(HOST, "example.org:8443")
            .body(())
            .unwrap();
        let target = ConnectionRequest::from_http_request(&request).unwrap();
        assert_eq!(target.hostname(), "example.org");
        assert_eq!(target.port(), 8443);
        assert_eq!(target.scheme(), Scheme::Tls);

        let request = Request::get("/get").body(()).unwrap();
        assert!(ConnectionRequest::from_http_request(&request).is_err());
    }
}
