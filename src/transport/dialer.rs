//! TCP dialer
//!
//! Opens the raw TCP connection for a request, either to an override
//! address (no DNS) or to the addresses the hostname resolves to.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::{debug, warn};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::common::{format_authority, ConnectError};
use crate::config::TransportConfig;

/// TCP connector with a connect timeout and socket options
#[derive(Debug, Clone)]
pub struct Dialer {
    connect_timeout: Duration,
    nodelay: bool,
    keepalive: Option<Duration>,
}

impl Default for Dialer {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl Dialer {
    /// Dialer with the given connect timeout, `TCP_NODELAY` on, no keepalive
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            nodelay: true,
            keepalive: None,
        }
    }

    /// Dialer described by a transport configuration
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            nodelay: config.tcp_nodelay,
            keepalive: config.tcp_keepalive(),
        }
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to `hostname:port`, or to `override_address` when given
    ///
    /// The whole attempt, DNS included, is bounded by the connect timeout.
    /// Resolved addresses are tried in order; the last error is returned if
    /// none of them accepts the connection.
    ///
    /// # Returns
    ///
    /// The connected stream and the address it is connected to
    pub async fn connect(
        &self,
        hostname: &str,
        port: u16,
        override_address: Option<SocketAddr>,
    ) -> Result<(TcpStream, SocketAddr), ConnectError> {
        let target = match override_address {
            Some(addr) => addr.to_string(),
            None => format_authority(hostname, port, 0),
        };

        self.bounded(target, self.dial(hostname, port, override_address)).await
    }

    /// Run a dial attempt under the connect timeout
    async fn bounded<F>(&self, target: String, attempt: F) -> Result<(TcpStream, SocketAddr), ConnectError>
    where
        F: Future<Output = Result<(TcpStream, SocketAddr), ConnectError>>,
    {
        match timeout(self.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Connection to {} timed out after {:?}", target, self.connect_timeout);
                Err(ConnectError::Timeout {
                    target,
                    timeout: self.connect_timeout,
                })
            }
        }
    }

    async fn dial(
        &self,
        hostname: &str,
        port: u16,
        override_address: Option<SocketAddr>,
    ) -> Result<(TcpStream, SocketAddr), ConnectError> {
        if let Some(addr) = override_address {
            debug!("Dialing override address {} for {}", addr, hostname);
            return self.connect_addr(addr).await;
        }

        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return self.connect_addr(SocketAddr::new(ip, port)).await;
        }

        let addrs: Vec<SocketAddr> = lookup_host((hostname, port))
            .await
            .map_err(|e| ConnectError::DnsFailure {
                host: hostname.to_string(),
                reason: e.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ConnectError::DnsFailure {
                host: hostname.to_string(),
                reason: "no addresses returned".to_string(),
            });
        }
        debug!("Resolved {} to {:?}", hostname, addrs);

        let mut last_error = None;
        for addr in addrs {
            match self.connect_addr(addr).await {
                Ok(connected) => return Ok(connected),
                Err(e) => {
                    debug!("Attempt to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectError::DnsFailure {
            host: hostname.to_string(),
            reason: "no addresses returned".to_string(),
        }))
    }

    async fn connect_addr(&self, addr: SocketAddr) -> Result<(TcpStream, SocketAddr), ConnectError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ConnectError::from_io(addr, e, self.connect_timeout))?;

        if let Err(e) = stream.set_nodelay(self.nodelay) {
            warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
        }
        if let Some(idle) = self.keepalive {
            let keepalive = TcpKeepalive::new().with_time(idle);
            if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
                warn!("Failed to enable TCP keepalive on {}: {}", addr, e);
            }
        }

        debug!("Connected to {}", addr);
        Ok((stream, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_override_address_skips_dns() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = Dialer::new(Duration::from_secs(2));
        let (stream, dialed) = dialer
            .connect("unresolvable.invalid", 443, Some(addr))
            .await
            .unwrap();

        assert_eq!(dialed, addr);
        assert_eq!(stream.peer_addr().unwrap(), addr);
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_ip_hostname_dials_directly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let dialer = Dialer::new(Duration::from_secs(2)).with_keepalive(Some(Duration::from_secs(30)));
        let (_stream, dialed) = dialer.connect("127.0.0.1", port, None).await.unwrap();
        assert_eq!(dialed.port(), port);
    }

    #[tokio::test]
    async fn test_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = Dialer::new(Duration::from_secs(2));
        let err = dialer.connect("example.org", 443, Some(addr)).await.unwrap_err();
        assert!(matches!(err, ConnectError::Refused { .. }), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_attempt_exceeding_timeout() {
        let dialer = Dialer::new(Duration::from_millis(50));
        let err = dialer
            .bounded("example.org:443".to_string(), std::future::pending())
            .await
            .unwrap_err();

        match err {
            ConnectError::Timeout { target, timeout } => {
                assert_eq!(target, "example.org:443");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_dns_failure() {
        let dialer = Dialer::new(Duration::from_secs(5));
        let err = dialer.connect("does-not-exist.invalid", 443, None).await.unwrap_err();
        assert!(
            matches!(err, ConnectError::DnsFailure { .. } | ConnectError::Timeout { .. }),
            "unexpected error: {}",
            err
        );
    }
}
