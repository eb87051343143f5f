//! Network utility functions
//!
//! Parsing of operator-supplied override addresses and formatting of
//! `host[:port]` authorities.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::config::ConfigError;

/// Parse an override address
///
/// Accepts a bare IP (`122.228.95.175`, `::1`, `[::1]`) or an IP with a
/// port (`122.228.95.175:8443`, `[::1]:8443`). Hostnames are rejected: an
/// override must never trigger DNS resolution.
///
/// # Returns
///
/// The address and the optional port
pub fn parse_override_addr(value: &str) -> Result<(IpAddr, Option<u16>), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidAddress {
            value: value.to_string(),
            reason: "address is empty".to_string(),
        });
    }

    // Try direct parsing first
    if let Ok(ip) = IpAddr::from_str(trimmed) {
        return Ok((ip, None));
    }

    if let Ok(socket_addr) = SocketAddr::from_str(trimmed) {
        if socket_addr.port() == 0 {
            return Err(ConfigError::InvalidAddress {
                value: value.to_string(),
                reason: "port must be greater than 0".to_string(),
            });
        }
        return Ok((socket_addr.ip(), Some(socket_addr.port())));
    }

    // Bracketed IPv6 without a port
    if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if let Ok(ip) = IpAddr::from_str(inner) {
            return Ok((ip, None));
        }
    }

    Err(ConfigError::InvalidAddress {
        value: value.to_string(),
        reason: "expected an IP address, optionally followed by :port".to_string(),
    })
}

/// Format `host[:port]`, omitting the port when it equals `default_port`
///
/// IPv6 literals are wrapped in brackets.
pub fn format_authority(host: &str, port: u16, default_port: u16) -> String {
    let host = match IpAddr::from_str(host) {
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => host.to_string(),
    };

    if port == default_port {
        host
    } else {
        format!("{}:{}", host, port)
    }
}
