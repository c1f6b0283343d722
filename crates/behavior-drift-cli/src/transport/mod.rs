//! Transport layer for the drift query service.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{router, HttpTransport};
