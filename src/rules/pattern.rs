//! Hostname patterns
//!
//! A pattern is either an exact hostname (`example.org`) or a wildcard
//! covering every subdomain of a suffix (`*.example.org`). Patterns and
//! looked-up hostnames go through the same normalization so that matching
//! is a plain string comparison.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::config::ConfigError;

/// Normalize a hostname for rule storage and lookup
///
/// Trims whitespace, lowercases, strips one trailing dot and strips the
/// brackets around IPv6 literals.
pub fn normalize_hostname(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.strip_suffix('.').unwrap_or(host);
    host.to_ascii_lowercase()
}

/// Hostname pattern of an override rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostPattern {
    /// Matches exactly one hostname
    Exact(String),
    /// Matches any hostname ending in `.suffix` (never the suffix itself)
    Wildcard {
        /// Normalized suffix without the leading `*.`
        suffix: String,
    },
}

impl HostPattern {
    /// Parse and normalize a pattern
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let normalized = normalize_hostname(pattern);

        if let Some(suffix) = normalized.strip_prefix("*.") {
            validate_name(pattern, suffix)?;
            if IpAddr::from_str(suffix).is_ok() {
                return Err(invalid(pattern, "wildcard suffix cannot be an IP address"));
            }
            return Ok(HostPattern::Wildcard { suffix: suffix.to_string() });
        }

        if IpAddr::from_str(&normalized).is_ok() {
            return Ok(HostPattern::Exact(normalized));
        }

        validate_name(pattern, &normalized)?;
        Ok(HostPattern::Exact(normalized))
    }

    /// Whether the pattern is a wildcard
    pub fn is_wildcard(&self) -> bool {
        matches!(self, HostPattern::Wildcard { .. })
    }

    /// Check a normalized hostname against this pattern
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(name) => name == host,
            HostPattern::Wildcard { suffix } => {
                host.len() > suffix.len() + 1
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
            }
        }
    }

    /// Length used to rank wildcard matches (longest suffix wins)
    pub fn specificity(&self) -> usize {
        match self {
            HostPattern::Exact(name) => name.len(),
            HostPattern::Wildcard { suffix } => suffix.len(),
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Exact(name) => write!(f, "{}", name),
            HostPattern::Wildcard { suffix } => write!(f, "*.{}", suffix),
        }
    }
}

impl FromStr for HostPattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidHostname {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// DNS-style label checks, lenient on underscores (seen in service names)
fn validate_name(original: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(invalid(original, "hostname is empty"));
    }
    if name.len() > 253 {
        return Err(invalid(original, "hostname is longer than 253 characters"));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(invalid(original, "hostname contains an empty label"));
        }
        if label.len() > 63 {
            return Err(invalid(original, "label is longer than 63 characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid(original, "label starts or ends with '-'"));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(invalid(original, "hostname contains invalid characters"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hostname() {
        assert_eq!(normalize_hostname("Example.ORG."), "example.org");
        assert_eq!(normalize_hostname("  api.example.org "), "api.example.org");
        assert_eq!(normalize_hostname("[::1]"), "::1");
    }

    #[test]
    fn test_parse_exact_and_wildcard() {
        assert_eq!(
            HostPattern::parse("Example.org").unwrap(),
            HostPattern::Exact("example.org".to_string())
        );
        assert_eq!(
            HostPattern::parse("*.Example.org").unwrap(),
            HostPattern::Wildcard { suffix: "example.org".to_string() }
        );
        assert_eq!(
            HostPattern::parse("122.228.95.175").unwrap(),
            HostPattern::Exact("122.228.95.175".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "*", "*.", "a..b", "foo*.example.org", "a.*.example.org", "-a.org", "exa mple.org", "*.10.0.0.1"] {
            assert!(HostPattern::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_wildcard_matching() {
        let pattern = HostPattern::parse("*.example.org").unwrap();
        assert!(pattern.matches("api.example.org"));
        assert!(pattern.matches("a.b.example.org"));
        assert!(!pattern.matches("example.org"));
        assert!(!pattern.matches("badexample.org"));
        assert!(!pattern.matches("example.org.evil"));
    }

    #[test]
    fn test_display_round_trip() {
        let pattern = HostPattern::parse("*.example.org").unwrap();
        assert_eq!(pattern.to_string(), "*.example.org");
    }
}
