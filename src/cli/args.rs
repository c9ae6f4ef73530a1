//! Command-line argument definitions.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::pipeline::OutputMode;

/// Per-record output choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputChoice {
    /// No per-record output
    None,
    /// One summary line per record
    Summary,
    /// Full field detail per record
    Detail,
}

impl From<OutputChoice> for OutputMode {
    fn from(choice: OutputChoice) -> Self {
        match choice {
            OutputChoice::None => OutputMode::None,
            OutputChoice::Summary => OutputMode::Summary,
            OutputChoice::Detail => OutputMode::Detail,
        }
    }
}

/// Process capture records through filters, taps and an optional rewrite.
#[derive(Parser, Debug)]
#[command(name = "pcapflow")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture file to read
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Read filter: records failing it never join the working set
    #[arg(short = 'R', long = "read-filter", value_name = "EXPR")]
    pub read_filter: Option<String>,

    /// Display filter: decides which records are emitted
    #[arg(short = 'Y', long = "display-filter", value_name = "EXPR")]
    pub display_filter: Option<String>,

    /// Scan the whole capture before emitting (two-pass mode)
    #[arg(short = '2', long = "two-pass")]
    pub two_pass: bool,

    /// Write passing records to a new capture file
    #[arg(short = 'w', long = "write", value_name = "OUTFILE")]
    pub write: Option<PathBuf>,

    /// Stop after reading this many records
    #[arg(short = 'c', long = "count", value_name = "N")]
    pub count: Option<u64>,

    /// Stop once this many captured bytes have been read
    #[arg(long = "max-bytes", value_name = "BYTES")]
    pub max_bytes: Option<u64>,

    /// Per-record output
    #[arg(short = 'T', long = "output", value_enum, default_value = "summary")]
    pub output: OutputChoice,

    /// Mark emitted records for colorization
    #[arg(long = "color")]
    pub color: bool,

    /// Collect and print statistics (protocol hierarchy, frame sizes)
    #[arg(long = "stats")]
    pub stats: bool,

    /// File listing enabled dissectors (one per line)
    #[arg(long = "enabled-dissectors", value_name = "FILE")]
    pub enabled_dissectors: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
