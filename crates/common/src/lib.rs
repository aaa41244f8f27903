//! Common types, protocol definitions, and errors shared across `getting-started` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
