//! Common Utilities
//!
//! Shared error types, path helpers and placeholder interpolation.

pub mod error;
pub mod interpolation;
pub mod paths;

pub use error::{CallError, ConfigError, LoadError, SpaceError, SpaceResult};
