//! TCP dissector.

use compact_str::{format_compact, CompactString};
use smallvec::SmallVec;

use etherparse::TcpHeaderSlice;

use super::{DissectContext, Dissector, FieldValue, LayerResult};

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u64 = 6;

/// TCP dissector.
#[derive(Debug, Clone, Copy)]
pub struct TcpDissector;

/// Build a `[SYN, ACK]`-style flag summary.
fn flag_summary(tcp: &TcpHeaderSlice<'_>) -> CompactString {
    let mut names: SmallVec<[&str; 4]> = SmallVec::new();
    if tcp.fin() {
        names.push("FIN");
    }
    if tcp.syn() {
        names.push("SYN");
    }
    if tcp.rst() {
        names.push("RST");
    }
    if tcp.psh() {
        names.push("PSH");
    }
    if tcp.ack() {
        names.push("ACK");
    }
    if tcp.urg() {
        names.push("URG");
    }
    format_compact!("[{}]", names.join(", "))
}

impl Dissector for TcpDissector {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn display_name(&self) -> &'static str {
        "TCP"
    }

    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(p) if p == IP_PROTO_TCP => Some(100),
            _ => None,
        }
    }

    fn dissect<'a>(&self, data: &'a [u8], _context: &DissectContext<'_>) -> LayerResult<'a> {
        match TcpHeaderSlice::from_slice(data) {
            Ok(tcp) => {
                let mut fields = SmallVec::new();

                fields.push(("src_port", FieldValue::UInt16(tcp.source_port())));
                fields.push(("dst_port", FieldValue::UInt16(tcp.destination_port())));
                fields.push(("seq", FieldValue::UInt32(tcp.sequence_number())));
                fields.push(("ack", FieldValue::UInt32(tcp.acknowledgment_number())));
                fields.push(("data_offset", FieldValue::UInt8(tcp.data_offset())));

                let mut tcp_flags: u16 = 0;
                if tcp.fin() {
                    tcp_flags |= 0x01;
                }
                if tcp.syn() {
                    tcp_flags |= 0x02;
                }
                if tcp.rst() {
                    tcp_flags |= 0x04;
                }
                if tcp.psh() {
                    tcp_flags |= 0x08;
                }
                if tcp.ack() {
                    tcp_flags |= 0x10;
                }
                if tcp.urg() {
                    tcp_flags |= 0x20;
                }
                fields.push(("flags", FieldValue::UInt16(tcp_flags)));
                fields.push(("flags_str", FieldValue::OwnedString(flag_summary(&tcp))));

                fields.push(("flag_fin", FieldValue::Bool(tcp.fin())));
                fields.push(("flag_syn", FieldValue::Bool(tcp.syn())));
                fields.push(("flag_rst", FieldValue::Bool(tcp.rst())));
                fields.push(("flag_psh", FieldValue::Bool(tcp.psh())));
                fields.push(("flag_ack", FieldValue::Bool(tcp.ack())));
                fields.push(("flag_urg", FieldValue::Bool(tcp.urg())));

                fields.push(("window", FieldValue::UInt16(tcp.window_size())));
                fields.push(("checksum", FieldValue::UInt16(tcp.checksum())));

                let mut child_hints = SmallVec::new();
                child_hints.push(("src_port", tcp.source_port() as u64));
                child_hints.push(("dst_port", tcp.destination_port() as u64));
                child_hints.push(("transport", IP_PROTO_TCP));

                let header_len = tcp.slice().len();
                LayerResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => LayerResult::malformed(format!("TCP dissect error: {e}"), data),
        }
    }
}
