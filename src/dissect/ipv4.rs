//! IPv4 dissector.
//!
//! Fragments are where cross-record dependencies come from: a non-first
//! fragment depends on every earlier fragment of the same datagram, which
//! the dissector reads from the fragment ledger and reports in
//! `depends_on`. The sighting itself is returned as a
//! [`FragmentObservation`](super::fragments::FragmentObservation) for the
//! orchestrator to commit.

use std::net::IpAddr;

use smallvec::SmallVec;

use etherparse::Ipv4HeaderSlice;

use super::ethernet::ethertype;
use super::fragments::{FragmentKey, FragmentObservation};
use super::{DissectContext, Dissector, FieldValue, LayerResult};

/// IPv4 dissector.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Dissector;

impl Dissector for Ipv4Dissector {
    fn name(&self) -> &'static str {
        "ipv4"
    }

    fn display_name(&self) -> &'static str {
        "IPv4"
    }

    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32> {
        match context.hint("ethertype") {
            Some(et) if et == ethertype::IPV4 as u64 => Some(100),
            _ => None,
        }
    }

    fn dissect<'a>(&self, data: &'a [u8], context: &DissectContext<'_>) -> LayerResult<'a> {
        let ipv4 = match Ipv4HeaderSlice::from_slice(data) {
            Ok(ipv4) => ipv4,
            Err(e) => return LayerResult::malformed(format!("IPv4 dissect error: {e}"), data),
        };

        let mut fields = SmallVec::new();

        fields.push(("version", FieldValue::UInt8(4)));
        fields.push(("ihl", FieldValue::UInt8(ipv4.ihl())));
        fields.push(("total_length", FieldValue::UInt16(ipv4.total_len())));
        fields.push(("identification", FieldValue::UInt16(ipv4.identification())));
        fields.push(("dont_fragment", FieldValue::Bool(ipv4.dont_fragment())));
        fields.push(("more_fragments", FieldValue::Bool(ipv4.more_fragments())));
        fields.push((
            "fragment_offset",
            FieldValue::UInt16(ipv4.fragments_offset().value()),
        ));
        fields.push(("ttl", FieldValue::UInt8(ipv4.ttl())));
        fields.push(("protocol", FieldValue::UInt8(ipv4.protocol().0)));
        fields.push(("checksum", FieldValue::UInt16(ipv4.header_checksum())));
        fields.push(("src_ip", FieldValue::ipv4(&ipv4.source())));
        fields.push(("dst_ip", FieldValue::ipv4(&ipv4.destination())));

        let protocol = ipv4.protocol().0;
        let frag_offset = ipv4.fragments_offset().value();
        let more_fragments = ipv4.more_fragments();
        let header_len = ipv4.slice().len();

        let mut result = if frag_offset > 0 {
            // Non-first fragment: the payload is a datagram slice, not a
            // parseable transport header. Terminal layer.
            LayerResult::success(fields, &[], SmallVec::new())
        } else {
            let mut child_hints = SmallVec::new();
            child_hints.push(("ip_protocol", protocol as u64));
            child_hints.push(("ip_version", 4));
            LayerResult::success(fields, &data[header_len..], child_hints)
        };

        if more_fragments || frag_offset > 0 {
            let key = FragmentKey {
                src: IpAddr::V4(ipv4.source_addr()),
                dst: IpAddr::V4(ipv4.destination_addr()),
                id: ipv4.identification(),
                protocol,
            };
            result
                .depends_on
                .extend_from_slice(context.fragments.frames(&key));
            result.fragment = Some(FragmentObservation {
                key,
                offset: frag_offset,
                more_fragments,
            });
        }

        result
    }
}
