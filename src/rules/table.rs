//! Override rule table
//!
//! Rules live in an immutable [`RuleSnapshot`] held behind an `ArcSwap`.
//! Lookups load the current snapshot without taking a lock; writers build a
//! modified copy and swap it in with read-copy-update, so a reader observes
//! either the old or the new table, never a partially written rule.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{debug, info};

use super::pattern::{normalize_hostname, HostPattern};
use crate::config::ConfigError;

/// A hostname → address override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    match_host: HostPattern,
    target_address: IpAddr,
    target_port: Option<u16>,
}

impl OverrideRule {
    /// Create a rule for an exact hostname or a `*.suffix` wildcard
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidHostname` if the pattern is malformed.
    pub fn new(
        match_host: &str,
        target_address: IpAddr,
        target_port: Option<u16>,
    ) -> Result<Self, ConfigError> {
        if target_port == Some(0) {
            return Err(ConfigError::InvalidAddress {
                value: format!("{}:0", target_address),
                reason: "port must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            match_host: HostPattern::parse(match_host)?,
            target_address,
            target_port,
        })
    }

    /// Pattern this rule matches
    pub fn match_host(&self) -> &HostPattern {
        &self.match_host
    }

    /// Address connections are redirected to
    pub fn target_address(&self) -> IpAddr {
        self.target_address
    }

    /// Port override, if any
    pub fn target_port(&self) -> Option<u16> {
        self.target_port
    }

    /// Socket address to dial for a request that asked for `requested_port`
    pub fn socket_addr(&self, requested_port: u16) -> SocketAddr {
        SocketAddr::new(self.target_address, self.target_port.unwrap_or(requested_port))
    }
}

impl fmt::Display for OverrideRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_port {
            Some(port) => write!(f, "{} -> {}", self.match_host, SocketAddr::new(self.target_address, port)),
            None => write!(f, "{} -> {}", self.match_host, self.target_address),
        }
    }
}

/// Immutable view of the rule table
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    exact: HashMap<String, Arc<OverrideRule>>,
    wildcards: Vec<Arc<OverrideRule>>,
    version: u64,
}

impl RuleSnapshot {
    /// Exact match first, then the wildcard with the longest suffix
    pub fn resolve(&self, hostname: &str) -> Option<Arc<OverrideRule>> {
        let host = normalize_hostname(hostname);

        if let Some(rule) = self.exact.get(&host) {
            return Some(Arc::clone(rule));
        }

        self.wildcards
            .iter()
            .filter(|rule| rule.match_host.matches(&host))
            .max_by_key(|rule| rule.match_host.specificity())
            .cloned()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcards.len()
    }

    /// Whether the snapshot holds no rules
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write counter; every upsert, remove or clear bumps it
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All rules, exact ones first, wildcards in registration order
    pub fn rules(&self) -> Vec<Arc<OverrideRule>> {
        let mut exact: Vec<_> = self.exact.values().cloned().collect();
        exact.sort_by(|a, b| a.match_host.to_string().cmp(&b.match_host.to_string()));
        exact.extend(self.wildcards.iter().cloned());
        exact
    }

    fn with_rule(&self, rule: Arc<OverrideRule>) -> Self {
        let mut next = self.clone();
        match rule.match_host.clone() {
            HostPattern::Exact(name) => {
                next.exact.insert(name, rule);
            }
            HostPattern::Wildcard { .. } => {
                // Re-registering a pattern moves it to the end of the list
                next.wildcards.retain(|r| r.match_host != rule.match_host);
                next.wildcards.push(rule);
            }
        }
        next.version += 1;
        next
    }

    fn without(&self, pattern: &HostPattern) -> Option<Self> {
        let mut next = self.clone();
        let removed = match pattern {
            HostPattern::Exact(name) => next.exact.remove(name).is_some(),
            HostPattern::Wildcard { .. } => {
                let before = next.wildcards.len();
                next.wildcards.retain(|r| &r.match_host != pattern);
                next.wildcards.len() != before
            }
        };

        if removed {
            next.version += 1;
            Some(next)
        } else {
            None
        }
    }
}

/// Thread-safe, read-mostly table of override rules
///
/// # Example
///
/// ```
/// use sni_override::rules::{OverrideRule, RuleTable};
///
/// let table = RuleTable::new();
/// table.upsert(OverrideRule::new("example.org", "122.228.95.175".parse().unwrap(), None).unwrap());
///
/// let rule = table.resolve("Example.ORG").unwrap();
/// assert_eq!(rule.target_address().to_string(), "122.228.95.175");
/// assert!(table.resolve("example.com").is_none());
/// ```
pub struct RuleTable {
    snapshot: ArcSwap<RuleSnapshot>,
}

impl RuleTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RuleSnapshot::default()),
        }
    }

    /// Insert or replace the rule for the rule's pattern
    pub fn upsert(&self, rule: OverrideRule) {
        let rule = Arc::new(rule);
        info!("Adding override: {}", rule);

        self.snapshot.rcu(|current| current.with_rule(Arc::clone(&rule)));
    }

    /// Remove the rule registered for `hostname`
    ///
    /// `hostname` may be an exact name or a `*.suffix` pattern. Unknown or
    /// malformed names are a no-op.
    ///
    /// # Returns
    ///
    /// Whether a rule was removed
    pub fn remove(&self, hostname: &str) -> bool {
        let pattern = match HostPattern::parse(hostname) {
            Ok(pattern) => pattern,
            Err(e) => {
                debug!("Ignoring removal of invalid pattern {}: {}", hostname, e);
                return false;
            }
        };

        let mut removed = false;
        self.snapshot.rcu(|current| match current.without(&pattern) {
            Some(next) => {
                removed = true;
                Arc::new(next)
            }
            None => {
                removed = false;
                Arc::clone(current)
            }
        });

        if removed {
            info!("Removed override for {}", pattern);
        } else {
            debug!("No override registered for {}", pattern);
        }
        removed
    }

    /// Find the rule that applies to `hostname`, if any
    pub fn resolve(&self, hostname: &str) -> Option<Arc<OverrideRule>> {
        self.snapshot.load().resolve(hostname)
    }

    /// Drop every rule
    pub fn clear(&self) {
        self.snapshot.rcu(|current| RuleSnapshot {
            exact: HashMap::new(),
            wildcards: Vec::new(),
            version: current.version + 1,
        });
        info!("Cleared all overrides");
    }

    /// Current snapshot; stays consistent for as long as it is held
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.snapshot.load_full()
    }

    /// All registered rules
    pub fn rules(&self) -> Vec<Arc<OverrideRule>> {
        self.snapshot.load().rules()
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Whether no rule is registered
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Write counter of the current snapshot
    pub fn version(&self) -> u64 {
        self.snapshot.load().version()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("RuleTable")
            .field("rules", &snapshot.len())
            .field("version", &snapshot.version())
            .finish()
    }
}
