//! Legacy PCAP writer with safe-write semantics.
//!
//! Records are written to a temporary file in the destination directory
//! and the file is only moved to its final name on [`CaptureWriter::close`].
//! An aborted run therefore never leaves a partially written capture at
//! the destination path.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::SinkError;

/// Upper bound on a single record's captured bytes.
pub const MAX_RECORD_BYTES: usize = 0x0400_0000;

/// Default snapshot length written to the global header.
pub const DEFAULT_SNAPLEN: u32 = 65535;

/// Writer producing a legacy PCAP file (little-endian).
#[derive(Debug)]
pub struct CaptureWriter {
    out: BufWriter<NamedTempFile>,
    dest: PathBuf,
    link_type: u16,
    nanosecond: bool,
    records: u64,
}

impl CaptureWriter {
    /// Create a writer targeting `dest`.
    ///
    /// The global header is written immediately; `nanosecond` selects the
    /// nanosecond-timestamp magic.
    pub fn create(
        dest: &Path,
        link_type: u16,
        snaplen: u32,
        nanosecond: bool,
    ) -> Result<Self, SinkError> {
        let dir = dest.parent().filter(|p| !p.as_os_str().is_empty());
        let tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
            .map_err(|e| SinkError::Create {
                path: dest.to_path_buf(),
                source: e,
            })?;
        let mut out = BufWriter::new(tmp);

        let magic: u32 = if nanosecond { 0xa1b23c4d } else { 0xa1b2c3d4 };
        let mut header = Vec::with_capacity(24);
        header.extend_from_slice(&magic.to_le_bytes());
        header.extend_from_slice(&2u16.to_le_bytes()); // version major
        header.extend_from_slice(&4u16.to_le_bytes()); // version minor
        header.extend_from_slice(&0u32.to_le_bytes()); // thiszone
        header.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        header.extend_from_slice(&snaplen.to_le_bytes());
        header.extend_from_slice(&(link_type as u32).to_le_bytes());
        out.write_all(&header).map_err(|e| SinkError::Create {
            path: dest.to_path_buf(),
            source: e,
        })?;

        Ok(CaptureWriter {
            out,
            dest: dest.to_path_buf(),
            link_type,
            nanosecond,
            records: 0,
        })
    }

    /// Append one record.
    pub fn write_record(
        &mut self,
        frame: u64,
        timestamp_us: i64,
        original_len: u32,
        data: &[u8],
    ) -> Result<(), SinkError> {
        if data.len() > MAX_RECORD_BYTES {
            return Err(SinkError::RecordTooLarge {
                frame,
                len: data.len(),
            });
        }

        let ts_sec = timestamp_us.div_euclid(1_000_000);
        let frac = timestamp_us.rem_euclid(1_000_000);
        let ts_frac = if self.nanosecond { frac * 1_000 } else { frac };

        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(&(ts_sec as u32).to_le_bytes());
        header[4..8].copy_from_slice(&(ts_frac as u32).to_le_bytes());
        header[8..12].copy_from_slice(&(data.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&original_len.to_le_bytes());

        self.out
            .write_all(&header)
            .and_then(|_| self.out.write_all(data))
            .map_err(|e| SinkError::Write { frame, source: e })?;

        self.records += 1;
        Ok(())
    }

    /// Link type declared in the global header.
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Records written so far.
    #[inline]
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Flush and move the temporary file to its final destination.
    ///
    /// Returns the number of records written.
    pub fn close(mut self) -> Result<u64, SinkError> {
        self.out.flush().map_err(|e| SinkError::Close {
            path: self.dest.clone(),
            reason: e.to_string(),
        })?;
        let tmp = self.out.into_inner().map_err(|e| SinkError::Close {
            path: self.dest.clone(),
            reason: e.to_string(),
        })?;
        tmp.persist(&self.dest).map_err(|e| SinkError::Close {
            path: self.dest.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureReader;

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pcap");

        let mut writer = CaptureWriter::create(&dest, 1, DEFAULT_SNAPLEN, false).unwrap();
        writer.write_record(1, 1_000_000, 14, &[0x11u8; 14]).unwrap();
        writer.write_record(2, 2_000_500, 20, &[0x22u8; 20]).unwrap();
        assert_eq!(writer.close().unwrap(), 2);

        let mut reader = CaptureReader::open(&dest).unwrap();
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.captured_len, 14);
        assert_eq!(first.timestamp_us, 1_000_000);
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.timestamp_us, 2_000_500);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_no_partial_file_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pcap");

        let mut writer = CaptureWriter::create(&dest, 1, DEFAULT_SNAPLEN, false).unwrap();
        writer.write_record(1, 0, 14, &[0u8; 14]).unwrap();
        // Destination must not exist until close() persists the temp file.
        assert!(!dest.exists());
        writer.close().unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn test_record_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pcap");

        let mut writer = CaptureWriter::create(&dest, 1, DEFAULT_SNAPLEN, false).unwrap();
        let oversized = vec![0u8; MAX_RECORD_BYTES + 1];
        assert!(matches!(
            writer.write_record(1, 0, 0, &oversized),
            Err(SinkError::RecordTooLarge { frame: 1, .. })
        ));
    }

    #[test]
    fn test_create_in_missing_directory() {
        let err = CaptureWriter::create(
            Path::new("/nonexistent-dir/out.pcap"),
            1,
            DEFAULT_SNAPLEN,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, SinkError::Create { .. }));
    }
}
