//! Error and response types shared by the CLI and the HTTP service.

pub mod error;
pub mod response;

pub use error::*;
pub use response::*;
