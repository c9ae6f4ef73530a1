//! Summary column construction.
//!
//! Columns are the one-line rendering of a record: source, destination,
//! protocol, info. They are only built when something consumes them (the
//! summary printer or a tap that declared the columns capability).

use compact_str::{format_compact, CompactString};

use super::context::LayerResult;

/// Summary columns for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    pub source: CompactString,
    pub destination: CompactString,
    pub protocol: CompactString,
    pub info: CompactString,
}

/// Short protocol label for the column display.
fn protocol_label(name: &'static str) -> &'static str {
    match name {
        "ethernet" => "ETH",
        "ipv4" => "IPv4",
        "ipv6" => "IPv6",
        "tcp" => "TCP",
        "udp" => "UDP",
        other => other,
    }
}

impl Columns {
    /// Build columns from dissected layers.
    pub fn from_layers(layers: &[(&'static str, LayerResult<'_>)]) -> Self {
        let mut source = CompactString::default();
        let mut destination = CompactString::default();

        // Network addresses win over link addresses.
        for (name, layer) in layers {
            let (src_field, dst_field) = match *name {
                "ethernet" => ("src_mac", "dst_mac"),
                "ipv4" | "ipv6" => ("src_ip", "dst_ip"),
                _ => continue,
            };
            if let Some(s) = layer.get(src_field).and_then(|v| v.as_string()) {
                source = CompactString::from(s);
            }
            if let Some(d) = layer.get(dst_field).and_then(|v| v.as_string()) {
                destination = CompactString::from(d);
            }
        }

        let protocol = layers
            .last()
            .map(|(name, _)| CompactString::const_new(protocol_label(name)))
            .unwrap_or_default();

        let info = Self::info_column(layers);

        Columns {
            source,
            destination,
            protocol,
            info,
        }
    }

    fn info_column(layers: &[(&'static str, LayerResult<'_>)]) -> CompactString {
        let Some((name, layer)) = layers.last() else {
            return CompactString::default();
        };

        match *name {
            "tcp" => {
                let src = layer.get("src_port").and_then(|v| v.as_u64()).unwrap_or(0);
                let dst = layer.get("dst_port").and_then(|v| v.as_u64()).unwrap_or(0);
                let flags = layer
                    .get("flags_str")
                    .and_then(|v| v.as_string())
                    .unwrap_or_default();
                let seq = layer.get("seq").and_then(|v| v.as_u64()).unwrap_or(0);
                let win = layer.get("window").and_then(|v| v.as_u64()).unwrap_or(0);
                format_compact!("{src} → {dst} {flags} Seq={seq} Win={win}")
            }
            "udp" => {
                let src = layer.get("src_port").and_then(|v| v.as_u64()).unwrap_or(0);
                let dst = layer.get("dst_port").and_then(|v| v.as_u64()).unwrap_or(0);
                let len = layer.get("length").and_then(|v| v.as_u64()).unwrap_or(0);
                format_compact!("{src} → {dst} Len={len}")
            }
            "ipv4" => {
                let offset = layer
                    .get("fragment_offset")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                let more = layer
                    .get("more_fragments")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if offset > 0 || more {
                    let proto = layer.get("protocol").and_then(|v| v.as_u64()).unwrap_or(0);
                    let id = layer
                        .get("identification")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    format_compact!(
                        "Fragmented IP protocol (proto={proto}, id=0x{id:04x}, off={offset})"
                    )
                } else {
                    CompactString::const_new(protocol_label(name))
                }
            }
            other => CompactString::const_new(protocol_label(other)),
        }
    }
}
