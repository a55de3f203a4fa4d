//! Common utilities and types shared across drivekit crates.
//!
//! This module provides the error taxonomy and the small identifier types
//! used by the credential flow and the Drive client.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FileId, Operation};
