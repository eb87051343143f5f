//! Override rules
//!
//! Hostname patterns and the concurrent rule table consulted on every
//! outbound connection.

mod pattern;
mod table;

pub use pattern::{normalize_hostname, HostPattern};
pub use table::{OverrideRule, RuleSnapshot, RuleTable};
