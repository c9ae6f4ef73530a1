//! Read and display filters.
//!
//! A filter expression is compiled once, before the run starts; syntax
//! errors therefore never abort a run in progress. The compiled predicate
//! is a pure function of a record's dissected layers (plus record-level
//! properties like captured length), which is why registering any filter
//! forces tree materialization in [`Requirements`](crate::dissect::Requirements).

mod ast;
mod parser;

pub use ast::{Cidr, CmpOp, Direction, FilterExpr, Literal, Primitive};

use std::net::IpAddr;

use crate::dissect::{Dissection, FieldValue};
use crate::error::FilterError;
use crate::frame::FrameRecord;

/// Layer names a field comparison may reference.
const KNOWN_LAYERS: &[&str] = &["frame", "ethernet", "ipv4", "ipv6", "tcp", "udp", "icmp"];

/// A compiled filter predicate.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    expr: FilterExpr,
    source: String,
}

/// Compile a filter expression.
pub fn compile(input: &str) -> Result<CompiledFilter, FilterError> {
    let expr = parser::parse_filter(input)?;
    validate(&expr)?;
    Ok(CompiledFilter {
        expr,
        source: input.trim().to_string(),
    })
}

/// Reject field comparisons against layers nothing can produce.
fn validate(expr: &FilterExpr) -> Result<(), FilterError> {
    match expr {
        FilterExpr::Primitive(Primitive::FieldCompare { layer, field, .. }) => {
            if KNOWN_LAYERS.contains(&layer.as_str()) {
                Ok(())
            } else {
                Err(FilterError::UnknownField(format!("{layer}.{field}")))
            }
        }
        FilterExpr::Primitive(_) => Ok(()),
        FilterExpr::Not(inner) => validate(inner),
        FilterExpr::And(left, right) | FilterExpr::Or(left, right) => {
            validate(left)?;
            validate(right)
        }
    }
}

impl CompiledFilter {
    /// The expression text this filter was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the filter against a dissected record.
    pub fn matches(&self, frame: &FrameRecord, dissection: &Dissection<'_>) -> bool {
        eval(&self.expr, frame, dissection)
    }
}

fn eval(expr: &FilterExpr, frame: &FrameRecord, d: &Dissection<'_>) -> bool {
    match expr {
        FilterExpr::Primitive(p) => eval_primitive(p, frame, d),
        FilterExpr::Not(inner) => !eval(inner, frame, d),
        FilterExpr::And(left, right) => eval(left, frame, d) && eval(right, frame, d),
        FilterExpr::Or(left, right) => eval(left, frame, d) || eval(right, frame, d),
    }
}

fn eval_primitive(p: &Primitive, frame: &FrameRecord, d: &Dissection<'_>) -> bool {
    match p {
        Primitive::Protocol(layer) => d.has_layer(layer),
        Primitive::Host { direction, address } => {
            match_address(d, *direction, |a| a == *address)
        }
        Primitive::Net { direction, cidr } => match_address(d, *direction, |a| cidr.contains(a)),
        Primitive::Port { direction, port } => match_port(d, *direction, |p| p == *port),
        Primitive::PortRange {
            direction,
            start,
            end,
        } => match_port(d, *direction, |p| p >= *start && p <= *end),
        Primitive::IpProto(num) => {
            let v4 = d.field("ipv4", "protocol").and_then(|v| v.as_u64());
            let v6 = d.field("ipv6", "next_header").and_then(|v| v.as_u64());
            v4 == Some(*num as u64) || v6 == Some(*num as u64)
        }
        Primitive::FrameLen { op, value } => {
            op.compare_i64(frame.captured_len as i64, *value as i64)
        }
        Primitive::FieldCompare {
            layer,
            field,
            op,
            value,
        } => compare_field(d.field(layer, field), *op, value),
    }
}

/// Resolve source/destination addresses across IP layers.
fn match_address<F: Fn(IpAddr) -> bool>(d: &Dissection<'_>, dir: Direction, pred: F) -> bool {
    let src = d
        .field("ipv4", "src_ip")
        .or_else(|| d.field("ipv6", "src_ip"))
        .and_then(|v| v.as_ip());
    let dst = d
        .field("ipv4", "dst_ip")
        .or_else(|| d.field("ipv6", "dst_ip"))
        .and_then(|v| v.as_ip());

    let src_hit = src.map(&pred).unwrap_or(false);
    let dst_hit = dst.map(&pred).unwrap_or(false);

    match dir {
        Direction::Src => src_hit,
        Direction::Dst => dst_hit,
        Direction::SrcOrDst => src_hit || dst_hit,
    }
}

/// Resolve source/destination ports across transport layers.
fn match_port<F: Fn(u16) -> bool>(d: &Dissection<'_>, dir: Direction, pred: F) -> bool {
    let transport = ["tcp", "udp"]
        .iter()
        .find_map(|name| d.layer(name));
    let Some(layer) = transport else {
        return false;
    };

    let src = layer
        .get("src_port")
        .and_then(|v| v.as_u64())
        .and_then(|v| u16::try_from(v).ok());
    let dst = layer
        .get("dst_port")
        .and_then(|v| v.as_u64())
        .and_then(|v| u16::try_from(v).ok());

    let src_hit = src.map(&pred).unwrap_or(false);
    let dst_hit = dst.map(&pred).unwrap_or(false);

    match dir {
        Direction::Src => src_hit,
        Direction::Dst => dst_hit,
        Direction::SrcOrDst => src_hit || dst_hit,
    }
}

/// Compare a dissected field against a literal.
///
/// A missing field matches only `!=`, mirroring the usual SQL-ish
/// pushdown behavior.
fn compare_field(field: Option<&FieldValue<'_>>, op: CmpOp, literal: &Literal) -> bool {
    let Some(field) = field else {
        return op == CmpOp::Ne;
    };

    match literal {
        Literal::Int(expected) => field
            .as_i64()
            .map(|v| op.compare_i64(v, *expected))
            .unwrap_or(op == CmpOp::Ne),
        Literal::Str(expected) => field
            .as_string()
            .map(|v| op.compare_str(&v, expected))
            .unwrap_or(op == CmpOp::Ne),
        Literal::Bool(expected) => match field.as_bool() {
            Some(v) => match op {
                CmpOp::Eq => v == *expected,
                CmpOp::Ne => v != *expected,
                _ => false,
            },
            None => op == CmpOp::Ne,
        },
        Literal::Ip(expected) => match field.as_ip() {
            Some(v) => match op {
                CmpOp::Eq => v == *expected,
                CmpOp::Ne => v != *expected,
                _ => false,
            },
            None => op == CmpOp::Ne,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissect::test_utils::{
        dissect_for_test, eth_ipv4_tcp_packet, eth_ipv4_udp_packet,
    };
    use crate::frame::FrameRecord;

    fn frame(captured_len: u32) -> FrameRecord {
        FrameRecord::new(1, 0, captured_len, captured_len, 1_000_000)
    }

    #[test]
    fn test_protocol_presence() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let d = dissect_for_test(&packet);
        let f = frame(packet.len() as u32);

        assert!(compile("tcp").unwrap().matches(&f, &d));
        assert!(compile("ip").unwrap().matches(&f, &d));
        assert!(!compile("udp").unwrap().matches(&f, &d));
        assert!(compile("not udp").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_port_filters() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let d = dissect_for_test(&packet);
        let f = frame(packet.len() as u32);

        assert!(compile("port 80").unwrap().matches(&f, &d));
        assert!(compile("dst port 80").unwrap().matches(&f, &d));
        assert!(!compile("src port 80").unwrap().matches(&f, &d));
        assert!(compile("portrange 79-81").unwrap().matches(&f, &d));
        assert!(!compile("portrange 81-90").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_host_and_net() {
        let packet = eth_ipv4_udp_packet(5353, 53, &[]);
        let d = dissect_for_test(&packet);
        let f = frame(packet.len() as u32);

        assert!(compile("host 192.168.1.1").unwrap().matches(&f, &d));
        assert!(compile("dst host 192.168.1.2").unwrap().matches(&f, &d));
        assert!(!compile("dst host 192.168.1.1").unwrap().matches(&f, &d));
        assert!(compile("net 192.168.0.0/16").unwrap().matches(&f, &d));
        assert!(!compile("net 10.0.0.0/8").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_proto_number() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let d = dissect_for_test(&packet);
        let f = frame(packet.len() as u32);

        assert!(compile("proto 6").unwrap().matches(&f, &d));
        assert!(!compile("proto 17").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_field_compare() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let d = dissect_for_test(&packet);
        let f = frame(packet.len() as u32);

        assert!(compile("tcp.dst_port == 80").unwrap().matches(&f, &d));
        assert!(compile("tcp.flag_syn == true").unwrap().matches(&f, &d));
        assert!(compile("ipv4.ttl >= 64").unwrap().matches(&f, &d));
        assert!(compile("ipv4.src_ip == 192.168.1.1").unwrap().matches(&f, &d));
        // Missing field only matches !=
        assert!(!compile("udp.length == 8").unwrap().matches(&f, &d));
        assert!(compile("udp.length != 8").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_frame_len() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let d = dissect_for_test(&packet);
        let f = frame(54);

        assert!(compile("frame.len == 54").unwrap().matches(&f, &d));
        assert!(compile("frame.len > 50").unwrap().matches(&f, &d));
        assert!(!compile("frame.len < 54").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_boolean_combinations() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let d = dissect_for_test(&packet);
        let f = frame(packet.len() as u32);

        assert!(compile("tcp and dst port 80").unwrap().matches(&f, &d));
        assert!(compile("udp or dst port 80").unwrap().matches(&f, &d));
        assert!(!compile("udp and dst port 80").unwrap().matches(&f, &d));
        assert!(compile("not (udp or icmp)").unwrap().matches(&f, &d));
    }

    #[test]
    fn test_unknown_layer_rejected() {
        assert!(matches!(
            compile("quic.version == 1"),
            Err(FilterError::UnknownField(_))
        ));
    }
}
