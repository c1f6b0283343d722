//! Command implementations shared by the binary and the HTTP service.

pub mod lookup;
pub mod pipeline;
