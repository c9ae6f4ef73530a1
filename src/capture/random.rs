//! Memory-mapped random access for the replay pass.
//!
//! Two-pass mode re-fetches each record's raw bytes by the stream offset
//! recorded during the first pass. The whole file is mapped and record
//! blocks are re-parsed in place; compressed captures have no stable byte
//! offsets and are rejected at open.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::Mmap;
use pcap_parser::pcapng::Block;
use pcap_parser::{parse_block_be, parse_block_le, parse_pcap_frame, parse_pcap_frame_be};

use crate::error::CaptureError;

use super::format::{CaptureFormat, Compression};
use super::reader::RawRecord;

/// Random-access view of an uncompressed capture file.
pub struct RandomAccessCapture {
    mmap: Mmap,
    path: PathBuf,
    format: CaptureFormat,
    /// PCAPNG sections are little- or big-endian per the byte-order magic.
    ng_big_endian: bool,
    link_type: u16,
}

impl RandomAccessCapture {
    /// Map a capture file for offset-based re-reads.
    ///
    /// Fails with [`CaptureError::NotSeekable`] for compressed input.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(|_| CaptureError::FileNotFound {
            path: path.clone(),
        })?;
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| CaptureError::Read {
                path: path.clone(),
                offset: 0,
                reason: e.to_string(),
            })?
        };

        if Compression::detect(&mmap).is_compressed() {
            return Err(CaptureError::NotSeekable { path });
        }

        let format = CaptureFormat::detect(&mmap)?;

        let (link_type, ng_big_endian) = if format.is_pcapng() {
            scan_pcapng_interface(&mmap)?
        } else {
            (legacy_link_type(&mmap, format)?, false)
        };

        Ok(RandomAccessCapture {
            mmap,
            path,
            format,
            ng_big_endian,
            link_type,
        })
    }

    /// Link type of the capture.
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Capture format detected at open.
    #[inline]
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the record block at `offset`, as stored in a
    /// [`RawRecord::file_offset`] during sequential reading.
    pub fn read_at(&self, offset: u64) -> Result<RawRecord, CaptureError> {
        let start = offset as usize;
        if start >= self.mmap.len() {
            return Err(CaptureError::BadOffset { offset });
        }
        let slice = &self.mmap[start..];

        if self.format.is_pcapng() {
            return self.read_ng_block(slice, offset);
        }

        let parsed = if self.format.is_big_endian() {
            parse_pcap_frame_be(slice)
        } else {
            parse_pcap_frame(slice)
        };
        let (_, packet) = parsed.map_err(|_| CaptureError::BadOffset { offset })?;

        let frac_us = if self.format.is_nanosecond() {
            (packet.ts_usec / 1_000) as i64
        } else {
            packet.ts_usec as i64
        };

        Ok(RawRecord {
            timestamp_us: (packet.ts_sec as i64) * 1_000_000 + frac_us,
            captured_len: packet.caplen,
            original_len: packet.origlen,
            link_type: self.link_type,
            file_offset: offset,
            data: Bytes::copy_from_slice(packet.data),
        })
    }

    fn read_ng_block(&self, slice: &[u8], offset: u64) -> Result<RawRecord, CaptureError> {
        let parsed = if self.ng_big_endian {
            parse_block_be(slice)
        } else {
            parse_block_le(slice)
        };
        let (_, block) = parsed.map_err(|_| CaptureError::BadOffset { offset })?;

        match block {
            Block::EnhancedPacket(epb) => Ok(RawRecord {
                timestamp_us: (((epb.ts_high as u64) << 32) | epb.ts_low as u64) as i64,
                captured_len: epb.caplen,
                original_len: epb.origlen,
                link_type: self.link_type,
                file_offset: offset,
                data: Bytes::copy_from_slice(epb.data),
            }),
            Block::SimplePacket(spb) => Ok(RawRecord {
                timestamp_us: 0,
                captured_len: spb.data.len() as u32,
                original_len: spb.origlen,
                link_type: self.link_type,
                file_offset: offset,
                data: Bytes::copy_from_slice(spb.data),
            }),
            _ => Err(CaptureError::BadOffset { offset }),
        }
    }
}

/// Read the link type from a legacy PCAP global header.
fn legacy_link_type(data: &[u8], format: CaptureFormat) -> Result<u16, CaptureError> {
    if data.len() < 24 {
        return Err(CaptureError::InvalidFormat {
            reason: "file too short for legacy PCAP header".to_string(),
        });
    }
    let raw = [data[20], data[21], data[22], data[23]];
    let network = if format.is_big_endian() {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    };
    Ok(network as u16)
}

/// Walk PCAPNG blocks to the first interface description.
///
/// Returns (link_type, big_endian).
fn scan_pcapng_interface(data: &[u8]) -> Result<(u16, bool), CaptureError> {
    // Byte-order magic sits at offset 8 of the section header block.
    if data.len() < 12 {
        return Err(CaptureError::InvalidFormat {
            reason: "file too short for PCAPNG section header".to_string(),
        });
    }
    let big_endian = data[8..12] == [0x1a, 0x2b, 0x3c, 0x4d];

    let mut remaining = data;
    loop {
        let parsed = if big_endian {
            parse_block_be(remaining)
        } else {
            parse_block_le(remaining)
        };
        match parsed {
            Ok((rest, block)) => {
                if let Block::InterfaceDescription(idb) = block {
                    return Ok((idb.linktype.0 as u16, big_endian));
                }
                remaining = rest;
            }
            Err(_) => {
                // No interface block found before the stream ran out;
                // fall back to Ethernet like the sequential reader does.
                return Ok((1, big_endian));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_pcap_with_two_records() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&65535u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());

        for (ts, len) in [(100u32, 14usize), (101, 20)] {
            data.extend_from_slice(&ts.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&(len as u32).to_le_bytes());
            data.extend_from_slice(&(len as u32).to_le_bytes());
            data.extend_from_slice(&vec![0xabu8; len]);
        }
        data
    }

    #[test]
    fn test_read_at_matches_sequential_offsets() {
        let bytes = build_pcap_with_two_records();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&bytes).unwrap();

        let capture = RandomAccessCapture::open(tmp.path()).unwrap();
        assert_eq!(capture.link_type(), 1);

        // Second record: header (24) + first block (16 + 14).
        let record = capture.read_at(24 + 30).unwrap();
        assert_eq!(record.captured_len, 20);
        assert_eq!(record.timestamp_us, 101 * 1_000_000);

        let first = capture.read_at(24).unwrap();
        assert_eq!(first.captured_len, 14);
    }

    #[test]
    fn test_read_at_bad_offset() {
        let bytes = build_pcap_with_two_records();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&bytes).unwrap();

        let capture = RandomAccessCapture::open(tmp.path()).unwrap();
        assert!(matches!(
            capture.read_at(1_000_000),
            Err(CaptureError::BadOffset { .. })
        ));
    }

    #[test]
    fn test_compressed_rejected() {
        use flate2::write::GzEncoder;
        use flate2::Compression as GzCompression;

        let bytes = build_pcap_with_two_records();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        {
            let file = std::fs::File::create(tmp.path()).unwrap();
            let mut encoder = GzEncoder::new(file, GzCompression::default());
            encoder.write_all(&bytes).unwrap();
            encoder.finish().unwrap();
        }

        assert!(matches!(
            RandomAccessCapture::open(tmp.path()),
            Err(CaptureError::NotSeekable { .. })
        ));
    }
}
