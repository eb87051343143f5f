//! Transport module
//!
//! Connection requests, the TCP dialer, the intercepting transport and
//! request rewriting.

mod connection;
mod dialer;
mod intercept;
mod request;
mod rewrite;

pub use connection::{EstablishedConnection, MaybeTlsStream};
pub use dialer::Dialer;
pub use intercept::{Connect, InterceptingTransport, SharedConnector};
pub use request::{ConnectionRequest, Scheme};
pub use rewrite::{encode_request_head, rewrite_headers, RequestRewriter};
