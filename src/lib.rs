//! # pcapflow
//!
//! A record-processing pipeline for captured network traffic: read a
//! capture, dissect each record into protocol layers, filter, feed
//! statistics taps, and optionally re-emit passing records into a new
//! capture file.
//!
//! The pipeline runs in one of two modes:
//!
//! - **one-pass**: a single streaming sweep; memory for completed
//!   records is reclaimed eagerly
//! - **two-pass**: a collecting pass fills the frame store and resolves
//!   cross-record dependencies (fragment chains), then a replaying pass
//!   re-fetches raw bytes by offset and performs full dissection,
//!   filtering and output
//!
//! Structured output (tree, columns) is only materialized when something
//! actually consumes it: the requested output mode, a registered tap, or
//! a filter. With nothing to filter and nothing to print, records stream
//! straight through to the output sink.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pcapflow::dissect::default_registry;
//! use pcapflow::pipeline::{Pipeline, RunConfig};
//!
//! let mut pipeline = Pipeline::new(default_registry(), RunConfig::default());
//! pipeline.set_display_filter(pcapflow::filter::compile("tcp.dst_port == 80").unwrap());
//!
//! let summary = pipeline
//!     .run("capture.pcap".as_ref(), &mut |record, dissection| {
//!         if let Some(columns) = dissection.and_then(|d| d.columns.as_ref()) {
//!             println!("{} {}", record.number, columns.info);
//!         }
//!     })
//!     .unwrap();
//! println!("{} records passed", summary.records_passed);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                            pcapflow                                 |
//! +---------------------------------------------------------------------+
//! |  capture/   - PCAP/PCAPNG reading, offsets, mmap re-reads, writer   |
//! |  dissect/   - Dissector trait, registry, layers, fragment ledger    |
//! |  filter/    - read/display filter language and evaluation           |
//! |  frame/     - FrameRecord store, time anchors                       |
//! |  tap/       - statistics listeners                                  |
//! |  sink/      - safe-write output capture                             |
//! |  pipeline/  - one-pass / two-pass orchestration                     |
//! |  config     - enabled-dissector persistence                         |
//! |  error      - error types                                           |
//! +---------------------------------------------------------------------+
//! ```

pub mod capture;
pub mod cli;
pub mod config;
pub mod dissect;
pub mod error;
pub mod filter;
pub mod frame;
pub mod pipeline;
pub mod sink;
pub mod tap;

// Re-export commonly used types at the crate root for convenience
pub use capture::{
    CaptureFormat, CaptureReader, CaptureWriter, Compression, RandomAccessCapture, RawRecord,
};
pub use dissect::{
    default_registry, dissect_record, Annotation, BuiltinDissector, Columns, DissectContext,
    Dissection, Dissector, DissectorRegistry, FieldValue, FragmentKey, FragmentLedger,
    FragmentObservation, LayerError, LayerResult, Requirements,
};
pub use error::{CaptureError, Error, FilterError, Result, SinkError};
pub use filter::CompiledFilter;
pub use frame::{FrameFlags, FrameRecord, FrameStore, Retention, TimeAnchors};
pub use pipeline::{OutputMode, PassPhase, Pipeline, RunConfig, RunSummary};
pub use sink::{OutputFormat, OutputSink, SinkParams};
pub use tap::{Tap, TapRegistry};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
