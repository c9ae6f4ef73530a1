//! IPv6 dissector.

use smallvec::SmallVec;

use etherparse::Ipv6HeaderSlice;

use super::ethernet::ethertype;
use super::{DissectContext, Dissector, FieldValue, LayerResult};

/// IPv6 dissector.
///
/// Extension headers are not walked; the next-header value of the fixed
/// header selects the child layer.
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Dissector;

impl Dissector for Ipv6Dissector {
    fn name(&self) -> &'static str {
        "ipv6"
    }

    fn display_name(&self) -> &'static str {
        "IPv6"
    }

    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32> {
        match context.hint("ethertype") {
            Some(et) if et == ethertype::IPV6 as u64 => Some(100),
            _ => None,
        }
    }

    fn dissect<'a>(&self, data: &'a [u8], _context: &DissectContext<'_>) -> LayerResult<'a> {
        match Ipv6HeaderSlice::from_slice(data) {
            Ok(ipv6) => {
                let mut fields = SmallVec::new();

                fields.push(("version", FieldValue::UInt8(6)));
                fields.push(("traffic_class", FieldValue::UInt8(ipv6.traffic_class())));
                fields.push(("flow_label", FieldValue::UInt32(ipv6.flow_label().value())));
                fields.push(("payload_length", FieldValue::UInt16(ipv6.payload_length())));
                fields.push(("next_header", FieldValue::UInt8(ipv6.next_header().0)));
                fields.push(("hop_limit", FieldValue::UInt8(ipv6.hop_limit())));
                fields.push(("src_ip", FieldValue::ipv6(&ipv6.source())));
                fields.push(("dst_ip", FieldValue::ipv6(&ipv6.destination())));

                let mut child_hints = SmallVec::new();
                child_hints.push(("ip_protocol", ipv6.next_header().0 as u64));
                child_hints.push(("ip_version", 6));

                let header_len = ipv6.slice().len();
                LayerResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => LayerResult::malformed(format!("IPv6 dissect error: {e}"), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissect::FragmentLedger;

    #[test]
    fn test_dissect_ipv6() {
        let mut header = [0u8; 40];
        header[0] = 0x60; // version 6
        header[4..6].copy_from_slice(&8u16.to_be_bytes()); // payload length
        header[6] = 17; // next header: UDP
        header[7] = 64; // hop limit
        header[8..24].copy_from_slice(&[
            0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
        ]);
        header[24..40].copy_from_slice(&[
            0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2,
        ]);

        let ledger = FragmentLedger::new();
        let mut ctx = DissectContext::new(1, 1, &ledger);
        ctx.parent = Some("ethernet");
        ctx.insert_hint("ethertype", ethertype::IPV6 as u64);

        let result = Ipv6Dissector.dissect(&header, &ctx);

        assert!(result.is_ok());
        assert_eq!(result.get("next_header"), Some(&FieldValue::UInt8(17)));
        assert_eq!(result.get("hop_limit"), Some(&FieldValue::UInt8(64)));
        assert_eq!(result.hint("ip_protocol"), Some(17));
        assert_eq!(
            result.get("src_ip").and_then(|v| v.as_string()).as_deref(),
            Some("2001:db8::1")
        );
    }

    #[test]
    fn test_dissect_too_short() {
        let ledger = FragmentLedger::new();
        let mut ctx = DissectContext::new(1, 1, &ledger);
        ctx.parent = Some("ethernet");
        ctx.insert_hint("ethertype", ethertype::IPV6 as u64);

        let result = Ipv6Dissector.dissect(&[0x60, 0x00], &ctx);
        assert!(!result.is_ok());
    }
}
