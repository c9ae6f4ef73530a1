//! Record dissection framework.
//!
//! This module provides:
//! - [`Dissector`] trait for implementing protocol dissectors
//! - [`DissectorRegistry`] for managing registered dissectors
//! - [`dissect_record`] - the chain loop turning raw bytes into layers
//! - [`Requirements`] - what a run needs dissection to materialize
//!
//! Dissection is a pure function of (bytes, context): dissectors never
//! mutate shared state. Cross-record discoveries (fragment sightings,
//! dependent frames) are returned to the orchestrator, which commits them
//! between records. This is what makes two-pass re-dissection
//! deterministic: same bytes, same ledger state, same result.
//!
//! | Layer | Dissectors |
//! |-------|------------|
//! | Link | Ethernet II |
//! | Network | IPv4, IPv6 |
//! | Transport | TCP, UDP |

mod columns;
mod context;
mod ethernet;
mod fragments;
mod ipv4;
mod ipv6;
mod tcp;
mod udp;
mod value;

#[cfg(test)]
pub mod test_utils;

pub use columns::Columns;
pub use context::{DissectContext, FieldEntry, HintEntry, LayerError, LayerResult};
pub use ethernet::{ethertype, EthernetDissector, LINKTYPE_ETHERNET};
pub use fragments::{FragmentKey, FragmentLedger, FragmentObservation};
pub use ipv4::Ipv4Dissector;
pub use ipv6::Ipv6Dissector;
pub use tcp::TcpDissector;
pub use udp::UdpDissector;
pub use value::FieldValue;

use crate::error::Error;

/// What a run needs dissection to materialize, computed before the run
/// from the union of: the requested output, every registered tap's
/// declared needs, and whether any filter exists (filter evaluation reads
/// field values, so a filter forces the tree).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Summary columns are consumed
    pub columns: bool,
    /// The protocol tree (layers with fields) is consumed
    pub tree: bool,
    /// The tree will be rendered, not just queried
    pub tree_visible: bool,
    /// Color classification is consumed
    pub color: bool,
}

impl Requirements {
    /// Union of two requirement sets.
    pub fn union(self, other: Self) -> Self {
        Requirements {
            columns: self.columns || other.columns,
            tree: self.tree || other.tree,
            tree_visible: self.tree_visible || other.tree_visible,
            color: self.color || other.color,
        }
    }

    /// Whether dissection has to run at all.
    pub fn needs_dissection(&self) -> bool {
        self.columns || self.tree
    }
}

/// Core trait all protocol dissectors implement.
pub trait Dissector: Send + Sync {
    /// Unique identifier for this dissector (e.g., "tcp").
    fn name(&self) -> &'static str;

    /// Human-readable display name.
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Check if this dissector can handle the given context.
    /// Returns a priority score (higher = more specific match),
    /// or `None` if it cannot handle the context.
    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32>;

    /// Dissect bytes into structured fields.
    fn dissect<'a>(&self, data: &'a [u8], context: &DissectContext<'_>) -> LayerResult<'a>;
}

/// Enum of all built-in dissectors.
///
/// Static dispatch: the chain loop runs per record, and the compiler can
/// inline match arms.
#[derive(Debug, Clone, Copy)]
pub enum BuiltinDissector {
    Ethernet(EthernetDissector),
    Ipv4(Ipv4Dissector),
    Ipv6(Ipv6Dissector),
    Tcp(TcpDissector),
    Udp(UdpDissector),
}

/// Delegate Dissector trait methods to inner types.
macro_rules! delegate_dissector {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            BuiltinDissector::Ethernet(d) => d.$method($($arg),*),
            BuiltinDissector::Ipv4(d) => d.$method($($arg),*),
            BuiltinDissector::Ipv6(d) => d.$method($($arg),*),
            BuiltinDissector::Tcp(d) => d.$method($($arg),*),
            BuiltinDissector::Udp(d) => d.$method($($arg),*),
        }
    };
}

impl Dissector for BuiltinDissector {
    #[inline]
    fn name(&self) -> &'static str {
        delegate_dissector!(self, name)
    }

    #[inline]
    fn display_name(&self) -> &'static str {
        delegate_dissector!(self, display_name)
    }

    #[inline]
    fn can_dissect(&self, context: &DissectContext<'_>) -> Option<u32> {
        delegate_dissector!(self, can_dissect, context)
    }

    #[inline]
    fn dissect<'a>(&self, data: &'a [u8], context: &DissectContext<'_>) -> LayerResult<'a> {
        delegate_dissector!(self, dissect, data, context)
    }
}

/// Registry of dissectors, selected per layer by priority score.
#[derive(Debug, Default)]
pub struct DissectorRegistry {
    dissectors: Vec<BuiltinDissector>,
}

impl DissectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dissector.
    pub fn register(&mut self, dissector: BuiltinDissector) {
        self.dissectors.push(dissector);
    }

    /// Find the highest-priority dissector for the context.
    pub fn find(&self, context: &DissectContext<'_>) -> Option<&BuiltinDissector> {
        self.dissectors
            .iter()
            .filter_map(|d| d.can_dissect(context).map(|score| (score, d)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, d)| d)
    }

    /// Drop dissectors the predicate rejects (persisted enable/disable
    /// lists are applied here before the run starts).
    pub fn retain_enabled<F: Fn(&str) -> bool>(&mut self, is_enabled: F) {
        self.dissectors.retain(|d| is_enabled(d.name()));
    }

    /// All registered dissectors.
    pub fn all(&self) -> &[BuiltinDissector] {
        &self.dissectors
    }

    /// Whether `name` is a registered dissector.
    pub fn knows(&self, name: &str) -> bool {
        self.dissectors.iter().any(|d| d.name() == name)
    }
}

/// Create a registry with all built-in dissectors.
pub fn default_registry() -> DissectorRegistry {
    let mut registry = DissectorRegistry::new();

    // Layer 2
    registry.register(BuiltinDissector::Ethernet(EthernetDissector));

    // Layer 3
    registry.register(BuiltinDissector::Ipv4(Ipv4Dissector));
    registry.register(BuiltinDissector::Ipv6(Ipv6Dissector));

    // Layer 4
    registry.register(BuiltinDissector::Tcp(TcpDissector));
    registry.register(BuiltinDissector::Udp(UdpDissector));

    registry
}

/// A per-record anomaly recorded during dissection.
///
/// Annotations never abort the pipeline; they ride along on the record.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Layer that reported the anomaly
    pub layer: &'static str,
    /// Description
    pub message: String,
}

/// Complete dissection of one record.
#[derive(Debug)]
pub struct Dissection<'data> {
    /// Dissected layers in chain order.
    pub layers: Vec<(&'static str, LayerResult<'data>)>,

    /// Summary columns, built only when required.
    pub columns: Option<Columns>,

    /// Frames this record's interpretation depends on.
    pub dependent_frames: Vec<u64>,

    /// Per-record anomalies (malformed/truncated content).
    pub annotations: Vec<Annotation>,

    /// Fragment sighting for the orchestrator to commit.
    pub fragment: Option<FragmentObservation>,
}

impl<'data> Dissection<'data> {
    /// Get a dissected layer by name.
    pub fn layer(&self, name: &str) -> Option<&LayerResult<'data>> {
        self.layers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, l)| l)
    }

    /// Whether a layer is present.
    pub fn has_layer(&self, name: &str) -> bool {
        self.layer(name).is_some()
    }

    /// Get a field from a named layer.
    pub fn field(&self, layer: &str, field: &str) -> Option<&FieldValue<'data>> {
        self.layer(layer).and_then(|l| l.get(field))
    }
}

/// Dissect one record through all protocol layers.
///
/// Pure with respect to shared state: reads the fragment ledger, returns
/// discoveries for the orchestrator to commit. The only error is resource
/// exhaustion reported by a dissector; every other anomaly becomes an
/// annotation and dissection of the record simply stops at that layer.
pub fn dissect_record<'a>(
    registry: &DissectorRegistry,
    frame_number: u64,
    link_type: u16,
    data: &'a [u8],
    fragments: &FragmentLedger,
    requirements: &Requirements,
) -> Result<Dissection<'a>, Error> {
    // Typical record has 3-4 layers (Eth/IP/Transport).
    let mut layers = Vec::with_capacity(4);
    let mut dependent_frames = Vec::new();
    let mut annotations = Vec::new();
    let mut fragment = None;

    let mut context = DissectContext::new(link_type, frame_number, fragments);
    let mut remaining = data;

    while !remaining.is_empty() {
        let Some(dissector) = registry.find(&context) else {
            break;
        };
        let result = dissector.dissect(remaining, &context);

        match &result.error {
            Some(LayerError::ResourceExhausted) => {
                return Err(Error::ResourceExhausted {
                    frame: frame_number,
                });
            }
            Some(LayerError::Malformed(message)) => {
                annotations.push(Annotation {
                    layer: dissector.name(),
                    message: message.clone(),
                });
            }
            None => {}
        }

        dependent_frames.extend_from_slice(&result.depends_on);
        if result.fragment.is_some() {
            fragment = result.fragment.clone();
        }

        context.parent = Some(dissector.name());
        context.hints = result.child_hints.clone();
        context.offset += remaining.len() - result.remaining.len();

        let should_stop = result.error.is_some();
        remaining = result.remaining;

        layers.push((dissector.name(), result));

        if should_stop {
            break;
        }
    }

    let columns = if requirements.columns {
        Some(Columns::from_layers(&layers))
    } else {
        None
    };

    Ok(Dissection {
        layers,
        columns,
        dependent_frames,
        annotations,
        fragment,
    })
}

#[cfg(test)]
mod tests {
    use super::test_utils::{eth_ipv4_fragment, eth_ipv4_tcp_packet, eth_ipv4_udp_packet};
    use super::*;

    #[test]
    fn test_chain_eth_ipv4_tcp() {
        let packet = eth_ipv4_tcp_packet(12345, 80);
        let registry = default_registry();
        let ledger = FragmentLedger::new();
        let req = Requirements {
            columns: true,
            tree: true,
            ..Requirements::default()
        };

        let dissection =
            dissect_record(&registry, 1, LINKTYPE_ETHERNET, &packet, &ledger, &req).unwrap();

        let names: Vec<_> = dissection.layers.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["ethernet", "ipv4", "tcp"]);
        assert!(dissection.annotations.is_empty());
        assert!(dissection.columns.is_some());
        assert_eq!(
            dissection.field("tcp", "dst_port"),
            Some(&FieldValue::UInt16(80))
        );
    }

    #[test]
    fn test_columns_skipped_when_not_required() {
        let packet = eth_ipv4_udp_packet(5353, 53, &[]);
        let registry = default_registry();
        let ledger = FragmentLedger::new();
        let req = Requirements {
            tree: true,
            ..Requirements::default()
        };

        let dissection =
            dissect_record(&registry, 1, LINKTYPE_ETHERNET, &packet, &ledger, &req).unwrap();
        assert!(dissection.columns.is_none());
        assert!(dissection.has_layer("udp"));
    }

    #[test]
    fn test_malformed_layer_becomes_annotation() {
        // Ethernet header promising IPv4, then a truncated IPv4 header.
        let mut packet = Vec::new();
        packet.extend_from_slice(&[0u8; 12]);
        packet.extend_from_slice(&[0x08, 0x00]);
        packet.extend_from_slice(&[0x45, 0x00]);

        let registry = default_registry();
        let ledger = FragmentLedger::new();
        let req = Requirements {
            tree: true,
            ..Requirements::default()
        };

        let dissection =
            dissect_record(&registry, 1, LINKTYPE_ETHERNET, &packet, &ledger, &req).unwrap();

        assert_eq!(dissection.annotations.len(), 1);
        assert_eq!(dissection.annotations[0].layer, "ipv4");
        // The malformed layer is still present, dissection stopped there.
        let names: Vec<_> = dissection.layers.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["ethernet", "ipv4"]);
    }

    #[test]
    fn test_redissection_is_deterministic() {
        let packet = eth_ipv4_fragment(0x1234, 2, false, &[0u8; 16]);
        let registry = default_registry();
        let mut ledger = FragmentLedger::new();
        ledger.observe(
            super::test_utils::fragment_key_for(&packet),
            1,
        );
        let req = Requirements {
            columns: true,
            tree: true,
            ..Requirements::default()
        };

        let first =
            dissect_record(&registry, 2, LINKTYPE_ETHERNET, &packet, &ledger, &req).unwrap();
        let second =
            dissect_record(&registry, 2, LINKTYPE_ETHERNET, &packet, &ledger, &req).unwrap();

        assert_eq!(first.dependent_frames, second.dependent_frames);
        assert_eq!(first.columns, second.columns);
        assert_eq!(first.layers.len(), second.layers.len());
        for ((name_a, layer_a), (name_b, layer_b)) in
            first.layers.iter().zip(second.layers.iter())
        {
            assert_eq!(name_a, name_b);
            assert_eq!(layer_a.fields, layer_b.fields);
        }
    }

    #[test]
    fn test_retain_enabled() {
        let mut registry = default_registry();
        registry.retain_enabled(|name| name != "tcp");
        assert!(!registry.knows("tcp"));
        assert!(registry.knows("udp"));

        let packet = eth_ipv4_tcp_packet(1, 2);
        let ledger = FragmentLedger::new();
        let req = Requirements {
            tree: true,
            ..Requirements::default()
        };
        let dissection =
            dissect_record(&registry, 1, LINKTYPE_ETHERNET, &packet, &ledger, &req).unwrap();
        let names: Vec<_> = dissection.layers.iter().map(|(n, _)| *n).collect();
        // The chain stops where the disabled dissector would have run.
        assert_eq!(names, vec!["ethernet", "ipv4"]);
    }
}
