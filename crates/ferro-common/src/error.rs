//! Error types for FerroDB

use thiserror::Error;

/// Result type alias using FerroDB's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for FerroDB
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    // Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors raised by the page store and the buffer pool.
///
/// The pin/flush variants carry enough context (file name, page, frame) to
/// format an actionable message; the file name is used for nothing else.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer exceeded: every frame in the pool is pinned")]
    BufferExceeded,

    #[error("Page {page_no} of file '{filename}' (frame {frame_no}) is not pinned")]
    PageNotPinned {
        filename: String,
        page_no: u64,
        frame_no: usize,
    },

    #[error("Page {page_no} of file '{filename}' (frame {frame_no}) is pinned")]
    PagePinned {
        filename: String,
        page_no: u64,
        frame_no: usize,
    },

    #[error("Bad buffer: frame {frame_no} (valid={valid}, dirty={dirty}, ref={ref_bit})")]
    BadBuffer {
        frame_no: usize,
        valid: bool,
        dirty: bool,
        ref_bit: bool,
    },

    #[error("Hash entry not found")]
    HashNotFound,

    #[error("Hash entry for page {page_no} already present (frame {frame_no})")]
    HashAlreadyPresent { page_no: u64, frame_no: usize },

    #[error("Page not found: {0}")]
    PageNotFound(u64),

    #[error("Page corrupted: {0}")]
    PageCorrupted(u64),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
