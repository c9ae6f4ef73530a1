//! Capture format and compression detection.

use std::io::Read;

use flate2::read::MultiGzDecoder;

use crate::error::CaptureError;

/// Compression wrapping the capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression
    None,
    /// Gzip (.gz)
    Gzip,
}

impl Compression {
    /// Detect compression from the first bytes of the file.
    pub fn detect(data: &[u8]) -> Self {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    /// Whether the stream needs decompression before parsing.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

/// Format of the capture file (after decompression).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
    /// PCAPNG format
    PcapNg,
}

impl CaptureFormat {
    /// Detect the capture format from magic bytes.
    ///
    /// The magic is compared in file order: a little-endian capture stores
    /// `0xa1b2c3d4` as `d4 c3 b2 a1` on disk.
    pub fn detect(data: &[u8]) -> Result<Self, CaptureError> {
        if data.len() < 4 {
            return Err(CaptureError::InvalidFormat {
                reason: "data too small for capture magic".into(),
            });
        }

        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

        match magic {
            0xa1b2c3d4 => Ok(CaptureFormat::LegacyLeMicro),
            0xd4c3b2a1 => Ok(CaptureFormat::LegacyBeMicro),
            0xa1b23c4d => Ok(CaptureFormat::LegacyLeNano),
            0x4d3cb2a1 => Ok(CaptureFormat::LegacyBeNano),
            0x0a0d0d0a => Ok(CaptureFormat::PcapNg),
            _ => Err(CaptureError::InvalidFormat {
                reason: format!("unknown capture magic: 0x{:08x}", magic),
            }),
        }
    }

    /// Whether this is a PCAPNG capture.
    pub fn is_pcapng(&self) -> bool {
        matches!(self, CaptureFormat::PcapNg)
    }

    /// Whether this is a legacy PCAP capture.
    pub fn is_legacy(&self) -> bool {
        !self.is_pcapng()
    }

    /// Whether legacy timestamps carry nanoseconds in the sub-second field.
    pub fn is_nanosecond(&self) -> bool {
        matches!(self, CaptureFormat::LegacyLeNano | CaptureFormat::LegacyBeNano)
    }

    /// Whether multi-byte header fields are big-endian.
    pub fn is_big_endian(&self) -> bool {
        matches!(self, CaptureFormat::LegacyBeMicro | CaptureFormat::LegacyBeNano)
    }
}

/// Read adapter that transparently decompresses the capture stream.
pub enum Decoder<R: Read> {
    /// Pass-through
    Plain(R),
    /// Gzip decompression
    Gzip(MultiGzDecoder<R>),
}

impl<R: Read> Decoder<R> {
    /// Wrap a reader according to the detected compression.
    pub fn new(inner: R, compression: Compression) -> Self {
        match compression {
            Compression::None => Decoder::Plain(inner),
            Compression::Gzip => Decoder::Gzip(MultiGzDecoder::new(inner)),
        }
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Decoder::Plain(r) => r.read(buf),
            Decoder::Gzip(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_detection() {
        let gzip_data = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00];
        assert_eq!(Compression::detect(&gzip_data), Compression::Gzip);

        let pcap_data = [0xd4, 0xc3, 0xb2, 0xa1, 0x00, 0x00];
        assert_eq!(Compression::detect(&pcap_data), Compression::None);

        assert!(!Compression::detect(&[0x1f]).is_compressed());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            CaptureFormat::detect(&[0xd4, 0xc3, 0xb2, 0xa1]).unwrap(),
            CaptureFormat::LegacyLeMicro
        );
        assert_eq!(
            CaptureFormat::detect(&[0xa1, 0xb2, 0xc3, 0xd4]).unwrap(),
            CaptureFormat::LegacyBeMicro
        );
        assert_eq!(
            CaptureFormat::detect(&[0x4d, 0x3c, 0xb2, 0xa1]).unwrap(),
            CaptureFormat::LegacyLeNano
        );
        assert_eq!(
            CaptureFormat::detect(&[0xa1, 0xb2, 0x3c, 0x4d]).unwrap(),
            CaptureFormat::LegacyBeNano
        );
        assert_eq!(
            CaptureFormat::detect(&[0x0a, 0x0d, 0x0d, 0x0a]).unwrap(),
            CaptureFormat::PcapNg
        );
        assert!(CaptureFormat::detect(&[0x00, 0x00, 0x00, 0x00]).is_err());
        assert!(CaptureFormat::detect(&[0xd4, 0xc3]).is_err());
    }

    #[test]
    fn test_format_properties() {
        assert!(CaptureFormat::LegacyLeNano.is_nanosecond());
        assert!(!CaptureFormat::LegacyLeMicro.is_nanosecond());
        assert!(CaptureFormat::LegacyBeMicro.is_big_endian());
        assert!(!CaptureFormat::LegacyLeMicro.is_big_endian());
        assert!(CaptureFormat::PcapNg.is_pcapng());
        assert!(CaptureFormat::LegacyLeMicro.is_legacy());
    }
}
