//! Error types for stemcast
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Every failure the engine can surface belongs to one of these variants, and
//! each variant has a fixed process exit code so scripts can distinguish
//! "bad arguments" from "speaker unreachable" from "died mid-stream".

use thiserror::Error;

/// Main error type for stemcast
#[derive(Error, Debug)]
pub enum Error {
    /// Bad CLI input: unknown stem name, empty stem list, malformed option
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unreadable or unsupported source file
    #[error("Decode error: {0}")]
    Decode(String),

    /// Stem separation model invocation failure
    #[error("Separation error: {0}")]
    Separation(String),

    /// Channel-count or stem-length mismatch during bus mixdown
    #[error("Mix error: {0}")]
    Mix(String),

    /// Device unreachable after the retry budget was spent
    #[error("Connection error: {0}")]
    Connection(String),

    /// Mid-stream write failure after the retry budget was spent
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error kind.
    ///
    /// 1 = argument/validation failure (includes decode and local I/O, which
    ///     abort before any device connection is attempted)
    /// 2 = device connection failure
    /// 3 = stem separation failure
    /// 4 = mid-stream failure after retries exhausted
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) | Error::Decode(_) | Error::Mix(_) => 1,
            Error::Config(_) | Error::Io(_) => 1,
            Error::Connection(_) => 2,
            Error::Separation(_) => 3,
            Error::Stream(_) => 4,
        }
    }

    /// Short stage name for user-facing failure reports.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Decode(_) => "decode",
            Error::Separation(_) => "separation",
            Error::Mix(_) => "mix",
            Error::Connection(_) => "connect",
            Error::Stream(_) => "stream",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

/// Convenience Result type using stemcast Error
pub type Result<T> = std::result::Result<T, Error>;
