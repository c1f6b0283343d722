//! Loaded drift output tables served to lookups.

pub mod store;

pub use store::DriftStore;
