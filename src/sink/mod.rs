//! Output sink: pass-through capture writer.
//!
//! Serializes passing records into a new capture file. Per-record write
//! failures abort the entire run - a partially written capture is worse
//! than no capture - and the underlying writer only moves the file to
//! its destination on [`close`](OutputSink::close).

use std::path::Path;

use crate::capture::{CaptureWriter, RawRecord, DEFAULT_SNAPLEN};
use crate::error::SinkError;
use crate::frame::FrameRecord;

/// Output capture formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Legacy PCAP
    #[default]
    Pcap,
}

impl OutputFormat {
    /// Resolve a format by name.
    pub fn from_name(name: &str) -> Result<Self, SinkError> {
        match name {
            "pcap" => Ok(OutputFormat::Pcap),
            other => Err(SinkError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }

    /// Name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pcap => "pcap",
        }
    }
}

/// Header parameters staged before the sink opens.
///
/// In two-pass mode these are gathered during the first pass (link type,
/// largest captured length, timestamp resolution) so the header written
/// at open matches the whole capture.
#[derive(Debug, Clone, Copy)]
pub struct SinkParams {
    pub link_type: u16,
    pub snaplen: u32,
    pub nanosecond: bool,
}

impl Default for SinkParams {
    fn default() -> Self {
        SinkParams {
            link_type: 1,
            snaplen: DEFAULT_SNAPLEN,
            nanosecond: false,
        }
    }
}

/// Pass-through writer for records that pass the filters (or are kept as
/// dependencies).
pub struct OutputSink {
    writer: CaptureWriter,
    link_type: u16,
}

impl OutputSink {
    /// Open the sink. Fails with a typed error for an unsupported format
    /// or an uncreatable destination.
    pub fn open(path: &Path, format: OutputFormat, params: SinkParams) -> Result<Self, SinkError> {
        match format {
            OutputFormat::Pcap => {}
        }
        let writer = CaptureWriter::create(
            path,
            params.link_type,
            params.snaplen,
            params.nanosecond,
        )?;
        Ok(OutputSink {
            writer,
            link_type: params.link_type,
        })
    }

    /// Append one record. Any failure here is fatal to the run.
    pub fn write(&mut self, frame: &FrameRecord, raw: &RawRecord) -> Result<(), SinkError> {
        if raw.link_type != self.link_type {
            return Err(SinkError::LinkTypeMismatch {
                frame: frame.number,
                expected: self.link_type,
                got: raw.link_type,
            });
        }
        self.writer.write_record(
            frame.number,
            frame.timestamp_us,
            frame.original_len,
            &raw.data,
        )
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.writer.record_count()
    }

    /// Finalize the output; the file only appears at its destination now.
    /// Returns the number of records written.
    pub fn close(self) -> Result<u64, SinkError> {
        self.writer.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn raw(link_type: u16) -> RawRecord {
        RawRecord {
            timestamp_us: 1_000_000,
            captured_len: 4,
            original_len: 4,
            link_type,
            file_offset: 0,
            data: Bytes::from_static(&[1, 2, 3, 4]),
        }
    }

    #[test]
    fn test_unknown_format_name() {
        assert!(matches!(
            OutputFormat::from_name("pcapng"),
            Err(SinkError::UnsupportedFormat { .. })
        ));
        assert_eq!(OutputFormat::from_name("pcap").unwrap(), OutputFormat::Pcap);
    }

    #[test]
    fn test_link_type_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pcap");

        let mut sink = OutputSink::open(&dest, OutputFormat::Pcap, SinkParams::default()).unwrap();
        let frame = FrameRecord::new(1, 0, 4, 4, 1_000_000);

        sink.write(&frame, &raw(1)).unwrap();
        assert!(matches!(
            sink.write(&frame, &raw(113)),
            Err(SinkError::LinkTypeMismatch { frame: 1, .. })
        ));
    }

    #[test]
    fn test_write_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pcap");

        let mut sink = OutputSink::open(&dest, OutputFormat::Pcap, SinkParams::default()).unwrap();
        let frame = FrameRecord::new(1, 0, 4, 4, 1_000_000);
        sink.write(&frame, &raw(1)).unwrap();
        assert_eq!(sink.records_written(), 1);
        assert_eq!(sink.close().unwrap(), 1);
        assert!(dest.exists());
    }
}
