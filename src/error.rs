//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it gives every failure in the measurement pipeline
//! one place to live, from a dropped serial link to a repeat file that does not
//! line up with its siblings.
//!
//! ## Error Hierarchy
//!
//! - **Transport** (`Transport`, `HandshakeUnderrun`, `UnexpectedEof`, `ReadTimeout`):
//!   the byte stream to the instrument failed. Fatal to the operation in flight,
//!   never retried automatically. See [`DaqError::is_transport`].
//! - **`MalformedResponse`**: the instrument answered with a line that does not carry
//!   a numeric second token. Aborts the current sweep.
//! - **`Alignment`**: repeat files for one component have different row counts, so
//!   position-aligned statistics are undefined.
//! - **`Filesystem`**: directory or file creation/write failure other than the
//!   expected "directory already exists".
//! - **`SweepAborted`**: wraps any of the above when it interrupts a sweep, recording
//!   where the partial sample file was left.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Invalid sweep configuration: {0}")]
    InvalidSweep(String),

    #[error("Transport error while {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Instrument handshake underrun: expected {expected} banner lines, received {received}")]
    HandshakeUnderrun { expected: usize, received: usize },

    #[error("Unexpected EOF from instrument while {context}")]
    UnexpectedEof { context: String },

    #[error("No response to {command} within {timeout:?}")]
    ReadTimeout { command: String, timeout: Duration },

    #[error("Malformed response to {command}: {reason} (line: {line:?})")]
    MalformedResponse {
        command: String,
        line: String,
        reason: String,
    },

    #[error(
        "Alignment error for '{component}': {} has {found_rows} rows, expected {expected_rows}",
        file.display()
    )]
    Alignment {
        component: String,
        expected_rows: usize,
        found_rows: usize,
        file: PathBuf,
    },

    #[error("No sample files for '{component}' in {}", dir.display())]
    NoSampleFiles { component: String, dir: PathBuf },

    #[error("Unreadable sample file {}: {reason}", path.display())]
    SampleFormat { path: PathBuf, reason: String },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operator confirmation unavailable: {0}")]
    OperatorAborted(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error(
        "Sweep for '{component}' aborted after {rows_written} rows (partial file {}): {source}",
        partial_file.display()
    )]
    SweepAborted {
        component: String,
        rows_written: usize,
        partial_file: PathBuf,
        #[source]
        source: Box<DaqError>,
    },
}

impl DaqError {
    /// Wrap an I/O error raised against `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DaqError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error raised on the instrument link.
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        DaqError::Transport {
            context: context.into(),
            source,
        }
    }

    /// The error underneath any `SweepAborted` wrapping.
    pub fn root(&self) -> &DaqError {
        match self {
            DaqError::SweepAborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the instrument link itself failed and cannot be trusted further.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.root(),
            DaqError::Transport { .. }
                | DaqError::HandshakeUnderrun { .. }
                | DaqError::UnexpectedEof { .. }
                | DaqError::ReadTimeout { .. }
        )
    }

    /// True for response-parsing failures that leave the link usable.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self.root(), DaqError::MalformedResponse { .. })
    }

    /// True for failures that must stop the whole run rather than one component.
    pub fn is_fatal_to_run(&self) -> bool {
        self.is_transport() || matches!(self.root(), DaqError::Filesystem { .. })
    }
}
