//! Synthesis Core
//!
//! Shared data model for the cross-card synthesis engine: the standardized
//! card records it consumes, the verdict it produces, and its configuration.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use config::*;
pub use error::*;
pub use result::*;
pub use types::*;
