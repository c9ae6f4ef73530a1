//! Capture file codec layer.
//!
//! This module owns everything that touches capture bytes on disk:
//!
//! - [`CaptureReader`] - sequential reading of legacy PCAP and PCAPNG,
//!   with gzip detection and per-record stream offsets
//! - [`RandomAccessCapture`] - mmap-backed offset re-reads for the
//!   replay pass of two-pass mode
//! - [`CaptureWriter`] - legacy PCAP output with temp-then-rename safety
//! - [`CaptureFormat`] / [`Compression`] - magic-byte detection
//!
//! Clean EOF is never an error; mid-stream failures are typed and carry
//! the file path so the orchestrator can report them.

mod format;
mod random;
mod reader;
mod writer;

pub use format::{CaptureFormat, Compression, Decoder};
pub use random::RandomAccessCapture;
pub use reader::{CaptureReader, RawRecord};
pub use writer::{CaptureWriter, DEFAULT_SNAPLEN, MAX_RECORD_BYTES};
