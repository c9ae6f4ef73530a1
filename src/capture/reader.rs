//! Sequential capture reader.
//!
//! Wraps `pcap_parser` readers for legacy PCAP and PCAPNG, with automatic
//! gzip detection, and tracks the stream offset of every record block so
//! the replay pass can re-fetch raw bytes by offset later.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapNGReader};

use crate::error::CaptureError;

use super::format::{CaptureFormat, Compression, Decoder};

/// Buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// One raw record as delivered by the codec layer.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Capture timestamp in microseconds since the Unix epoch
    pub timestamp_us: i64,
    /// Captured length (may be less than original)
    pub captured_len: u32,
    /// Original length on the wire
    pub original_len: u32,
    /// Link-layer type (e.g., 1 = Ethernet)
    pub link_type: u16,
    /// Offset of the record block in the (decompressed) capture stream,
    /// usable with [`RandomAccessCapture::read_at`](super::RandomAccessCapture::read_at)
    pub file_offset: u64,
    /// Record bytes
    pub data: Bytes,
}

/// Sequential reader over a capture file.
///
/// Returns `Ok(None)` from [`next_record`](Self::next_record) at a clean
/// end of file; a short read mid-record is a typed error carrying the path.
pub struct CaptureReader {
    inner: ReaderInner,
    path: PathBuf,
    format: CaptureFormat,
    compression: Compression,
    stream_pos: u64,
    frame_number: u64,
    link_type: u16,
}

impl std::fmt::Debug for CaptureReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureReader")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("compression", &self.compression)
            .field("stream_pos", &self.stream_pos)
            .field("frame_number", &self.frame_number)
            .field("link_type", &self.link_type)
            .finish_non_exhaustive()
    }
}

/// Inner reader using enum dispatch for format-specific handling.
enum ReaderInner {
    Legacy(LegacyPcapReader<BufReader<Decoder<File>>>),
    Ng(PcapNGReader<BufReader<Decoder<File>>>),
}

impl CaptureReader {
    /// Open a capture file for sequential reading.
    ///
    /// Detects gzip compression and the capture format from magic bytes.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();

        let mut file = File::open(&path).map_err(|_| CaptureError::FileNotFound {
            path: path.clone(),
        })?;

        // Probe the raw head for compression, then the decompressed head
        // for the capture magic.
        let mut head = [0u8; 6];
        let n = file.read(&mut head).map_err(|e| CaptureError::Read {
            path: path.clone(),
            offset: 0,
            reason: e.to_string(),
        })?;
        if n < 4 {
            return Err(CaptureError::InvalidFormat {
                reason: "file too short".to_string(),
            });
        }
        let compression = Compression::detect(&head);

        file.seek(SeekFrom::Start(0)).map_err(|e| CaptureError::Read {
            path: path.clone(),
            offset: 0,
            reason: e.to_string(),
        })?;

        let mut probe = Decoder::new(file, compression);
        let mut magic = [0u8; 4];
        probe.read_exact(&mut magic).map_err(|_| CaptureError::InvalidFormat {
            reason: "file too short to read capture magic".to_string(),
        })?;
        let format = CaptureFormat::detect(&magic)?;
        drop(probe);

        // Re-open with a fresh decoder; the probe consumed bytes we need.
        let file = File::open(&path).map_err(|_| CaptureError::FileNotFound {
            path: path.clone(),
        })?;
        let decoder = Decoder::new(file, compression);
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, decoder);

        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, buf_reader).map_err(|e| {
                CaptureError::InvalidFormat {
                    reason: format!("failed to parse PCAPNG: {}", e),
                }
            })?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, buf_reader).map_err(|e| {
                CaptureError::InvalidFormat {
                    reason: format!("failed to parse legacy PCAP: {}", e),
                }
            })?;
            ReaderInner::Legacy(reader)
        };

        Ok(CaptureReader {
            inner,
            path,
            format,
            compression,
            stream_pos: 0,
            frame_number: 0,
            link_type: 1, // default to Ethernet, updated from headers
        })
    }

    /// Read the next record. Returns `Ok(None)` at end of file.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>, CaptureError> {
        match &mut self.inner {
            ReaderInner::Legacy(reader) => read_legacy_record(
                reader,
                &self.path,
                self.format,
                &mut self.stream_pos,
                &mut self.frame_number,
                &mut self.link_type,
            ),
            ReaderInner::Ng(reader) => read_pcapng_record(
                reader,
                &self.path,
                &mut self.stream_pos,
                &mut self.frame_number,
                &mut self.link_type,
            ),
        }
    }

    /// Link type of the capture (e.g., 1 = Ethernet).
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Number of records read so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Capture format detected at open.
    #[inline]
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Whether stored offsets can be used for random access re-reads.
    /// Compressed streams have no stable byte offsets.
    #[inline]
    pub fn is_seekable(&self) -> bool {
        !self.compression.is_compressed()
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for CaptureReader {
    type Item = Result<RawRecord, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Convert legacy timestamp fields to microseconds.
///
/// Nanosecond-format files carry nanoseconds in the sub-second field.
fn legacy_timestamp_us(ts_sec: u32, ts_frac: u32, format: CaptureFormat) -> i64 {
    let frac_us = if format.is_nanosecond() {
        (ts_frac / 1_000) as i64
    } else {
        ts_frac as i64
    };
    (ts_sec as i64) * 1_000_000 + frac_us
}

/// Read the next record from a legacy PCAP reader.
fn read_legacy_record<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    path: &Path,
    format: CaptureFormat,
    stream_pos: &mut u64,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawRecord>, CaptureError> {
    use pcap_parser::PcapError as PcapParserError;

    let mut stalled = false;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                stalled = false;
                match block {
                    PcapBlockOwned::Legacy(packet) => {
                        *frame_number += 1;

                        if packet.data.len() < packet.caplen as usize {
                            return Err(CaptureError::TruncatedRecord {
                                frame: *frame_number,
                                expected: packet.caplen as usize,
                                actual: packet.data.len(),
                            });
                        }

                        let raw = RawRecord {
                            timestamp_us: legacy_timestamp_us(
                                packet.ts_sec,
                                packet.ts_usec,
                                format,
                            ),
                            captured_len: packet.caplen,
                            original_len: packet.origlen,
                            link_type: *link_type,
                            file_offset: *stream_pos,
                            data: Bytes::copy_from_slice(packet.data),
                        };

                        *stream_pos += offset as u64;
                        reader.consume(offset);
                        return Ok(Some(raw));
                    }
                    PcapBlockOwned::LegacyHeader(header) => {
                        *link_type = header.network.0 as u16;
                        *stream_pos += offset as u64;
                        reader.consume(offset);
                    }
                    _ => {
                        *stream_pos += offset as u64;
                        reader.consume(offset);
                    }
                }
            }
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                if stalled {
                    // Refill made no progress: the file ends mid-record.
                    return Err(CaptureError::Read {
                        path: path.to_path_buf(),
                        offset: *stream_pos,
                        reason: "file truncated mid-record".to_string(),
                    });
                }
                reader.refill().map_err(|e| CaptureError::Read {
                    path: path.to_path_buf(),
                    offset: *stream_pos,
                    reason: format!("legacy PCAP refill error: {}", e),
                })?;
                stalled = true;
            }
            Err(e) => {
                return Err(CaptureError::Read {
                    path: path.to_path_buf(),
                    offset: *stream_pos,
                    reason: format!("legacy PCAP parse error: {}", e),
                });
            }
        }
    }
}

/// Read the next record from a PCAPNG reader.
fn read_pcapng_record<S: Read>(
    reader: &mut PcapNGReader<S>,
    path: &Path,
    stream_pos: &mut u64,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawRecord>, CaptureError> {
    use pcap_parser::pcapng::Block;
    use pcap_parser::PcapError as PcapParserError;

    let mut stalled = false;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                stalled = false;
                match block {
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        *link_type = idb.linktype.0 as u16;
                        *stream_pos += offset as u64;
                        reader.consume(offset);
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        *frame_number += 1;

                        // Interface timestamp resolution defaults to
                        // microseconds; ticks are used as-is.
                        let timestamp_us =
                            (((epb.ts_high as u64) << 32) | epb.ts_low as u64) as i64;

                        let raw = RawRecord {
                            timestamp_us,
                            captured_len: epb.caplen,
                            original_len: epb.origlen,
                            link_type: *link_type,
                            file_offset: *stream_pos,
                            data: Bytes::copy_from_slice(epb.data),
                        };

                        *stream_pos += offset as u64;
                        reader.consume(offset);
                        return Ok(Some(raw));
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        *frame_number += 1;

                        let raw = RawRecord {
                            timestamp_us: 0,
                            captured_len: spb.data.len() as u32,
                            original_len: spb.origlen,
                            link_type: *link_type,
                            file_offset: *stream_pos,
                            data: Bytes::copy_from_slice(spb.data),
                        };

                        *stream_pos += offset as u64;
                        reader.consume(offset);
                        return Ok(Some(raw));
                    }
                    _ => {
                        *stream_pos += offset as u64;
                        reader.consume(offset);
                    }
                }
            }
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                if stalled {
                    return Err(CaptureError::Read {
                        path: path.to_path_buf(),
                        offset: *stream_pos,
                        reason: "file truncated mid-block".to_string(),
                    });
                }
                reader.refill().map_err(|e| CaptureError::Read {
                    path: path.to_path_buf(),
                    offset: *stream_pos,
                    reason: format!("PCAPNG refill error: {}", e),
                })?;
                stalled = true;
            }
            Err(e) => {
                return Err(CaptureError::Read {
                    path: path.to_path_buf(),
                    offset: *stream_pos,
                    reason: format!("PCAPNG parse error: {}", e),
                });
            }
        }
    }
}
