//! Field value types for dissection.
//!
//! Values are zero-copy where possible: `Str` and `Bytes` reference the
//! record data directly, `OwnedString` is used when a value has to be
//! constructed (formatted addresses, flag summaries).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use compact_str::CompactString;

/// Possible field value types.
///
/// The lifetime parameter `'data` ties a value to the record bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'data> {
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// Signed 64-bit integer
    Int64(i64),
    /// Boolean value
    Bool(bool),

    /// IP address (v4 or v6)
    IpAddr(IpAddr),
    /// MAC address (6 bytes)
    MacAddr([u8; 6]),

    /// Zero-copy string reference into record data
    Str(&'data str),
    /// Zero-copy byte slice reference into record data
    Bytes(&'data [u8]),

    /// Owned string for constructed values.
    /// Uses CompactString for small-string optimization.
    OwnedString(CompactString),

    /// Null/missing value
    Null,
}

impl<'data> FieldValue<'data> {
    /// Create a MAC address from bytes.
    pub fn mac(bytes: &[u8]) -> Self {
        if bytes.len() >= 6 {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&bytes[..6]);
            FieldValue::MacAddr(mac)
        } else {
            FieldValue::Null
        }
    }

    /// Create an IPv4 address from bytes.
    pub fn ipv4(bytes: &[u8]) -> Self {
        if bytes.len() >= 4 {
            FieldValue::IpAddr(IpAddr::V4(Ipv4Addr::new(
                bytes[0], bytes[1], bytes[2], bytes[3],
            )))
        } else {
            FieldValue::Null
        }
    }

    /// Create an IPv6 address from bytes.
    pub fn ipv6(bytes: &[u8]) -> Self {
        if bytes.len() >= 16 {
            let mut arr = [0u8; 16];
            arr.copy_from_slice(&bytes[..16]);
            FieldValue::IpAddr(IpAddr::V6(Ipv6Addr::from(arr)))
        } else {
            FieldValue::Null
        }
    }

    /// Format a MAC address as a string.
    pub fn format_mac(mac: &[u8; 6]) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }

    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt8(v) => Some(*v as u64),
            FieldValue::UInt16(v) => Some(*v as u64),
            FieldValue::UInt32(v) => Some(*v as u64),
            FieldValue::UInt64(v) => Some(*v),
            FieldValue::Int64(v) => u64::try_from(*v).ok(),
            FieldValue::Bool(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::UInt8(v) => Some(*v as i64),
            FieldValue::UInt16(v) => Some(*v as i64),
            FieldValue::UInt32(v) => Some(*v as i64),
            FieldValue::UInt64(v) => i64::try_from(*v).ok(),
            FieldValue::Int64(v) => Some(*v),
            FieldValue::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Try to get as a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as an IP address.
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            FieldValue::IpAddr(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Get a string rendering of the value, if it has one.
    pub fn as_string(&self) -> Option<String> {
        match self {
            FieldValue::Str(s) => Some((*s).to_string()),
            FieldValue::OwnedString(s) => Some(s.to_string()),
            FieldValue::IpAddr(addr) => Some(addr.to_string()),
            FieldValue::MacAddr(mac) => Some(Self::format_mac(mac)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_construction() {
        let value = FieldValue::mac(&[0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe]);
        assert_eq!(
            value.as_string().as_deref(),
            Some("de:ad:be:ef:ca:fe")
        );

        assert!(FieldValue::mac(&[0x00, 0x11]).is_null());
    }

    #[test]
    fn test_ip_construction() {
        let v4 = FieldValue::ipv4(&[192, 168, 1, 1]);
        assert_eq!(v4.as_string().as_deref(), Some("192.168.1.1"));
        assert!(FieldValue::ipv4(&[1, 2]).is_null());

        let v6 = FieldValue::ipv6(&[0u8; 16]);
        assert_eq!(v6.as_string().as_deref(), Some("::"));
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(FieldValue::UInt16(80).as_u64(), Some(80));
        assert_eq!(FieldValue::UInt16(80).as_i64(), Some(80));
        assert_eq!(FieldValue::Int64(-1).as_u64(), None);
        assert_eq!(FieldValue::Bool(true).as_i64(), Some(1));
        assert_eq!(FieldValue::Null.as_u64(), None);
    }
}
