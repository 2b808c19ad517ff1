//! Error types for text file operations.
//!
//! This module provides the [`TextError`] type for all crate operations
//! and the [`Result`] convenience type.

use thiserror::Error;

/// Error type for all text file operations.
///
/// Decode degradation is deliberately *not* represented here: a failed
/// decode never aborts a read. It downgrades the content to a raw-byte
/// representation and is reported through the handle's last-error field.
#[derive(Error, Debug)]
pub enum TextError {
    /// The file could not be opened or read.
    #[error("Read error: {0}")]
    Read(String),

    /// The file could not be opened for writing, or no candidate encoding
    /// could represent the text.
    #[error("Write error: {0}")]
    Write(String),

    /// A strict decode or encode attempt failed for one encoding.
    ///
    /// On the read path this never escapes the crate; it is recorded as
    /// the handle's last error and the content falls back to raw bytes.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A requested or detected encoding name is not registered.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// IO error from the underlying source/destination.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for [`std::result::Result`] with [`TextError`].
pub type Result<T> = std::result::Result<T, TextError>;
