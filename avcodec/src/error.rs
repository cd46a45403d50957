// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for codec buffer and capability operations.
//!
//! This module defines the error type returned by every fallible operation in
//! the crate, and maps raw driver status codes to idiomatic Rust error variants.

use crate::{
    buffer::BufferId,
    driver::{
        STATUS_ERR_BUSY, STATUS_ERR_INVALID_PARAM, STATUS_ERR_NO_MEMORY, STATUS_ERR_UNSUPPORTED,
        STATUS_OK, Status,
    },
};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Coarse error category, used when reporting errors to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-correctable configuration problem.
    Configuration,
    /// Operation invoked from a state that forbids it.
    State,
    /// Buffer or memory pressure, or buffer lifecycle misuse.
    Resource,
    /// Expected during steady-state operation; re-poll.
    Transient,
    /// In-band stream condition (end of stream, format change).
    Stream,
    /// The driver or hardware rejected an operation.
    Hardware,
    /// Anything else (I/O, parse, serialization).
    Other,
}

/// Errors that can occur when using the codec engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested configuration falls outside every advertised capability.
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfig(String),

    /// A descriptor or format key is not part of the recognized key set.
    #[error("Unrecognized key: {0}")]
    UnrecognizedKey(String),

    /// An argument was malformed or out of its legal domain.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// The operation is not legal in the current state. State is left unchanged.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The platform could not provide memory or buffers.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Buffers are still owned by the codec or awaiting pull.
    #[error("Busy: {0}")]
    Busy(String),

    /// A buffer that is already free was released again.
    #[error("Double release of buffer {0}")]
    DoubleRelease(BufferId),

    /// The port is not running (not started yet, flushing or deactivated).
    #[error("Port not ready")]
    NotReady,

    /// The port's buffer mode does not allow the requested initialization path.
    #[error("Invalid buffer mode: {0}")]
    InvalidMode(String),

    /// Nothing was ready within the timeout. Not a failure.
    #[error("No buffer available")]
    NoBufferAvailable,

    /// A blocked call was woken by a stop or flush.
    #[error("Cancelled")]
    Cancelled,

    /// The codec has delivered its last buffer.
    #[error("End of stream")]
    EndOfStream,

    /// The output format changed and the port must be reconfigured.
    #[error("Format changed")]
    FormatChanged,

    /// The driver reported a failure status.
    #[error("Hardware error: status {0}")]
    Hardware(Status),

    /// The capability descriptor could not be read or parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic error for failures not covered by a dedicated variant.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to read a configuration or descriptor file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize JSON configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Converts a driver status code to a Rust [`Result`].
    ///
    /// # Arguments
    ///
    /// * `status` - The raw status code reported by a [`crate::CodecDriver`]
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `status == STATUS_OK`
    /// - `Err(Error::...)` for any error status code
    ///
    /// # Examples
    ///
    /// ```
    /// use avcodec::{Error, driver::{STATUS_OK, STATUS_ERR_NO_MEMORY}};
    ///
    /// assert!(Error::from_status(STATUS_OK).is_ok());
    /// assert!(matches!(
    ///     Error::from_status(STATUS_ERR_NO_MEMORY),
    ///     Err(Error::ResourceExhausted(_))
    /// ));
    /// ```
    pub fn from_status(status: Status) -> Result<()> {
        match status {
            STATUS_OK => Ok(()),
            STATUS_ERR_NO_MEMORY => Err(Error::ResourceExhausted(
                "driver could not allocate memory".to_string(),
            )),
            STATUS_ERR_BUSY => Err(Error::Busy("driver is busy".to_string())),
            STATUS_ERR_INVALID_PARAM | STATUS_ERR_UNSUPPORTED => Err(Error::Hardware(status)),
            other => Err(Error::Hardware(other)),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedConfig(_) | Error::UnrecognizedKey(_) | Error::IllegalArgument(_) => {
                ErrorKind::Configuration
            }
            Error::IllegalState(_) | Error::InvalidMode(_) => ErrorKind::State,
            Error::ResourceExhausted(_) | Error::Busy(_) | Error::DoubleRelease(_) => {
                ErrorKind::Resource
            }
            Error::NoBufferAvailable | Error::NotReady | Error::Cancelled => ErrorKind::Transient,
            Error::EndOfStream | Error::FormatChanged => ErrorKind::Stream,
            Error::Hardware(_) => ErrorKind::Hardware,
            Error::Parse(_) | Error::Other(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Other,
        }
    }

    /// Returns a numeric code for observer notifications.
    ///
    /// Hardware errors carry the driver status; everything else reports a
    /// stable negative code per variant.
    pub fn code(&self) -> i32 {
        match self {
            Error::Hardware(status) => *status,
            Error::UnsupportedConfig(_) => -100,
            Error::UnrecognizedKey(_) => -101,
            Error::IllegalArgument(_) => -102,
            Error::IllegalState(_) => -200,
            Error::InvalidMode(_) => -201,
            Error::ResourceExhausted(_) => -300,
            Error::Busy(_) => -301,
            Error::DoubleRelease(_) => -302,
            Error::NoBufferAvailable => -400,
            Error::NotReady => -401,
            Error::Cancelled => -402,
            Error::EndOfStream => -500,
            Error::FormatChanged => -501,
            Error::Parse(_) => -600,
            Error::Io(_) => -601,
            Error::Json(_) => -602,
            Error::Other(_) => -699,
        }
    }

    /// Returns `true` for the "nothing ready yet" outcome of a timed pull.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NoBufferAvailable)
    }
}
