//! Error types for PacketMaker.
//!
//! Library crates use [`PacketError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all PacketMaker operations.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Curriculum data failed validation (e.g. a reading with nothing to print).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An output artifact already exists and overwrite was not requested.
    #[error("{path:?} exists, set `overwrite` to replace it")]
    ArtifactExists { path: PathBuf },

    /// The output root is not readable and writable.
    #[error("insufficient permissions for {path:?}: {message}")]
    Permission { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Template loading or rendering error.
    #[error("template error: {0}")]
    Template(String),

    /// Reading, editing or writing a page document failed.
    #[error("PDF error at {path:?}: {message}")]
    Pdf { path: PathBuf, message: String },

    /// Image decoding, cropping or encoding error.
    #[error("image error: {0}")]
    Image(String),

    /// Network/HTTP error while fetching a best-effort asset.
    #[error("network error: {0}")]
    Network(String),

    /// The external document converter failed.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PacketError>;

impl PacketError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a PDF error for the document at `path`.
    pub fn pdf(path: impl Into<PathBuf>, msg: impl std::fmt::Display) -> Self {
        Self::Pdf {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    /// Create a permission error for `path`.
    pub fn permission(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Permission {
            path: path.into(),
            message: msg.into(),
        }
    }
}
