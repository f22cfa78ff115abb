//! Typed errors for conditions callers act on.
//!
//! Library functions return `anyhow::Result`; when a failure means "bad
//! input" or "no such thing" they raise an [`AtelierError`] so the HTTP
//! layer can pick a status with `downcast_ref` instead of reading the
//! message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtelierError {
    /// Requested row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
