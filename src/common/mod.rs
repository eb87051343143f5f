//! Common module
//!
//! This module contains the error taxonomy, logging setup and network
//! helpers shared by the rest of the crate.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{ConnectError, OverrideError, Phase, Result, TlsError};
pub use log::init_logger;
pub use net::{format_authority, parse_override_addr};
