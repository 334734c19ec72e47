//! Error types for the interrupt event pipeline

use thiserror::Error;

/// Errors that can occur while opening, mapping or running a session
#[derive(Error, Debug)]
pub enum IrqError {
    /// Device handle could not be acquired
    #[error("failed to open device {path}: {source}")]
    Open {
        /// Device path that was attempted
        path: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Shared region could not be mapped
    #[error("failed to map shared region: {source}")]
    Mapping {
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Mapped region length does not match the agreed layout
    #[error("mapped region is {actual} bytes, expected {expected} (capacity/layout mismatch)")]
    MappingSize {
        /// Expected page-aligned byte length
        expected: usize,
        /// Actual mapped byte length
        actual: usize,
    },

    /// `start()` called while a session is already active
    #[error("listener is already running")]
    AlreadyRunning,

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("system call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for pipeline operations
pub type IrqResult<T> = Result<T, IrqError>;
