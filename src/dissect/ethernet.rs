//! Ethernet II dissector.

use smallvec::SmallVec;

use etherparse::Ethernet2HeaderSlice;

use super::{DissectContext, Dissector, FieldValue, LayerResult};

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u16 = 1;

/// Well-known EtherType values.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
}

/// Ethernet II dissector.
#[derive(Debug, Clone, Copy)]
pub struct EthernetDissector;

impl Dissector for EthernetDissector {
    fn name(&self) -> &'static str {
        "ethernet"
    }

    fn display_name(&self) -> &'static str {
        "Ethernet II"
    }

    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32> {
        if context.is_root() && context.link_type == LINKTYPE_ETHERNET {
            return Some(100);
        }
        None
    }

    fn dissect<'a>(&self, data: &'a [u8], _context: &DissectContext<'_>) -> LayerResult<'a> {
        match Ethernet2HeaderSlice::from_slice(data) {
            Ok(eth) => {
                let mut fields = SmallVec::new();

                fields.push(("src_mac", FieldValue::mac(&eth.source())));
                fields.push(("dst_mac", FieldValue::mac(&eth.destination())));
                fields.push(("ethertype", FieldValue::UInt16(eth.ether_type().0)));

                let mut child_hints = SmallVec::new();
                child_hints.push(("ethertype", eth.ether_type().0 as u64));

                let header_len = eth.slice().len();
                LayerResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => LayerResult::malformed(format!("Ethernet dissect error: {e}"), data),
        }
    }
}
