//! Error types for pcapflow.
//!
//! This module provides structured error types for all pipeline operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`CaptureError`] - Errors from reading capture files
//! - [`FilterError`] - Errors from filter compilation
//! - [`SinkError`] - Errors from writing an output capture
//!
//! All errors implement `std::error::Error` and can be converted to
//! `anyhow::Error`. Per-record anomalies (malformed headers, truncated
//! payloads) are *not* errors: they surface as annotations on the record's
//! dissection and processing continues.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pcapflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a capture file
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Error compiling a filter expression
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// Error writing the output capture
    #[error("output error: {0}")]
    Sink(#[from] SinkError),

    /// A dissector could not obtain memory; the run cannot continue.
    #[error("dissection exhausted resources at frame {frame}")]
    ResourceExhausted { frame: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to reading capture files.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Invalid capture format
    #[error("invalid capture format: {reason}")]
    InvalidFormat { reason: String },

    /// I/O or parse failure mid-stream (clean EOF is not an error)
    #[error("{path}: read error at offset {offset}: {reason}")]
    Read {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Record header promised more bytes than the stream delivered
    #[error("truncated record at frame {frame}: expected {expected} bytes, got {actual}")]
    TruncatedRecord {
        frame: u64,
        expected: usize,
        actual: usize,
    },

    /// Random access requested on a source that cannot seek
    #[error("{path}: not seekable (two-pass mode requires an uncompressed capture)")]
    NotSeekable { path: PathBuf },

    /// A stored offset did not resolve to a record block
    #[error("no record block at offset {offset}")]
    BadOffset { offset: u64 },
}

/// Errors related to filter compilation.
///
/// These are configuration-time errors: they are reported before the run
/// starts and the run does not begin.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Empty filter expression
    #[error("empty filter expression")]
    Empty,

    /// Expression did not parse
    #[error("filter syntax error: {0}")]
    Syntax(String),

    /// Field comparison names a protocol the registry does not know
    #[error("unknown filter field: {0}")]
    UnknownField(String),
}

/// Errors related to writing an output capture.
///
/// Any write failure is fatal to the run: a partially written capture file
/// is considered worse than no file.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Output format is not supported
    #[error("unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    /// The format cannot carry this link type
    #[error("link type {link_type} cannot be written as {format}")]
    UnsupportedLinkType { link_type: u16, format: &'static str },

    /// Record link type differs from the file header's (format cannot mix)
    #[error("record {frame} has link type {got}, file was opened with {expected}")]
    LinkTypeMismatch { frame: u64, expected: u16, got: u16 },

    /// Could not create the destination file
    #[error("cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Record exceeds the format's size bound
    #[error("record {frame} too large for format ({len} bytes)")]
    RecordTooLarge { frame: u64, len: usize },

    /// Write failed mid-record
    #[error("write failed at record {frame}: {source}")]
    Write {
        frame: u64,
        source: std::io::Error,
    },

    /// Finalizing the output failed
    #[error("cannot finalize {path}: {reason}")]
    Close { path: PathBuf, reason: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
