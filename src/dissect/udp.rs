//! UDP dissector.

use smallvec::SmallVec;

use etherparse::UdpHeaderSlice;

use super::{DissectContext, Dissector, FieldValue, LayerResult};

/// IP protocol number for UDP.
pub const IP_PROTO_UDP: u64 = 17;

/// UDP dissector.
#[derive(Debug, Clone, Copy)]
pub struct UdpDissector;

impl Dissector for UdpDissector {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn display_name(&self) -> &'static str {
        "UDP"
    }

    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(p) if p == IP_PROTO_UDP => Some(100),
            _ => None,
        }
    }

    fn dissect<'a>(&self, data: &'a [u8], _context: &DissectContext<'_>) -> LayerResult<'a> {
        match UdpHeaderSlice::from_slice(data) {
            Ok(udp) => {
                let mut fields = SmallVec::new();

                fields.push(("src_port", FieldValue::UInt16(udp.source_port())));
                fields.push(("dst_port", FieldValue::UInt16(udp.destination_port())));
                fields.push(("length", FieldValue::UInt16(udp.length())));
                fields.push(("checksum", FieldValue::UInt16(udp.checksum())));

                let mut child_hints = SmallVec::new();
                child_hints.push(("src_port", udp.source_port() as u64));
                child_hints.push(("dst_port", udp.destination_port() as u64));
                child_hints.push(("transport", IP_PROTO_UDP));

                let header_len = udp.slice().len();
                LayerResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => LayerResult::malformed(format!("UDP dissect error: {e}"), data),
        }
    }
}
