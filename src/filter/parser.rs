//! Filter expression parser using nom.
//!
//! Grammar (operator precedence: NOT > AND > OR):
//! ```text
//! filter     = expr
//! expr       = term (("or") term)*
//! term       = factor (("and") factor)*
//! factor     = "not" factor | "(" expr ")" | primitive
//! primitive  = fieldcmp | proto | net | portrange | port | host | protocol
//! fieldcmp   = ident "." ident CMP literal
//! ```

use std::net::IpAddr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many0,
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use super::ast::{Cidr, CmpOp, Direction, FilterExpr, Literal, Primitive};
use crate::error::FilterError;

/// Parse a complete filter expression.
pub fn parse_filter(input: &str) -> Result<FilterExpr, FilterError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FilterError::Empty);
    }

    match all_consuming(delimited(multispace0, expr, multispace0))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(e) => Err(FilterError::Syntax(format!("{e}"))),
    }
}

// =============================================================================
// Expression parsers (operator precedence)
// =============================================================================

/// Parse an expression (OR level - lowest precedence).
fn expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, tag_no_case("or"), multispace1),
        term,
    ))(input)?;

    let result = rest.into_iter().fold(first, FilterExpr::or);
    Ok((input, result))
}

/// Parse a term (AND level).
fn term(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(preceded(
        delimited(multispace0, tag_no_case("and"), multispace1),
        factor,
    ))(input)?;

    let result = rest.into_iter().fold(first, FilterExpr::and);
    Ok((input, result))
}

/// Parse a factor (NOT and parentheses).
fn factor(input: &str) -> IResult<&str, FilterExpr> {
    alt((not_expr, paren_expr, primitive_expr))(input)
}

/// Parse NOT expression.
fn not_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, _) = tag_no_case("not")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, expr) = factor(input)?;
    Ok((input, FilterExpr::negate(expr)))
}

/// Parse parenthesized expression.
fn paren_expr(input: &str) -> IResult<&str, FilterExpr> {
    delimited(
        pair(char('('), multispace0),
        expr,
        pair(multispace0, char(')')),
    )(input)
}

/// Parse a primitive expression.
fn primitive_expr(input: &str) -> IResult<&str, FilterExpr> {
    map(primitive, FilterExpr::Primitive)(input)
}

// =============================================================================
// Primitive parsers
// =============================================================================

/// Parse any primitive filter. Field comparisons go first: they are the
/// only primitive containing a dot, and `tcp.dst_port` must not be eaten
/// by the `tcp` protocol keyword.
fn primitive(input: &str) -> IResult<&str, Primitive> {
    alt((
        field_compare,
        proto_num_filter,
        net_filter,
        portrange_filter,
        port_filter,
        host_filter,
        protocol_filter,
    ))(input)
}

/// Parse protocol presence: tcp, udp, icmp, ip, ip6, arp.
/// The keyword resolves to the layer name it tests for.
fn protocol_filter(input: &str) -> IResult<&str, Primitive> {
    map(protocol_layer, |layer: &str| {
        Primitive::Protocol(layer.to_string())
    })(input)
}

fn protocol_layer(input: &str) -> IResult<&str, &'static str> {
    alt((
        value("tcp", tag_no_case("tcp")),
        value("udp", tag_no_case("udp")),
        value("icmp", tag_no_case("icmp")),
        value("arp", tag_no_case("arp")),
        value("ipv6", tag_no_case("ip6")),
        value("ipv4", tag_no_case("ip")),
    ))(input)
}

/// Parse direction qualifier.
fn direction(input: &str) -> IResult<&str, Direction> {
    alt((
        value(Direction::Src, tag_no_case("src")),
        value(Direction::Dst, tag_no_case("dst")),
    ))(input)
}

/// Parse host filter: [src|dst] host <address>
fn host_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = tag_no_case("host")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, addr) = ip_address(input)?;

    Ok((
        input,
        Primitive::Host {
            direction: dir.unwrap_or_default(),
            address: addr,
        },
    ))
}

/// Parse port filter: [src|dst] port <number>
fn port_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = tag_no_case("port")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, port) = port_number(input)?;

    Ok((
        input,
        Primitive::Port {
            direction: dir.unwrap_or_default(),
            port,
        },
    ))
}

/// Parse port range filter: [src|dst] portrange <start>-<end>
fn portrange_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = tag_no_case("portrange")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (start, end)) = separated_pair(port_number, char('-'), port_number)(input)?;

    Ok((
        input,
        Primitive::PortRange {
            direction: dir.unwrap_or_default(),
            start,
            end,
        },
    ))
}

/// Parse network filter: [src|dst] net <cidr>
fn net_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = tag_no_case("net")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (address, prefix)) = separated_pair(ip_address, char('/'), prefix_len)(input)?;

    Ok((
        input,
        Primitive::Net {
            direction: dir.unwrap_or_default(),
            cidr: Cidr {
                address,
                prefix_len: prefix,
            },
        },
    ))
}

/// Parse IP protocol number filter: proto <number>
fn proto_num_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, _) = tag_no_case("proto")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, num) = map_res(digit1, str::parse::<u8>)(input)?;
    Ok((input, Primitive::IpProto(num)))
}

/// Parse a field comparison: layer.field CMP literal
fn field_compare(input: &str) -> IResult<&str, Primitive> {
    let (input, (layer, _, field)) = tuple((identifier, char('.'), identifier))(input)?;
    let (input, op) = delimited(multispace0, cmp_op, multispace0)(input)?;
    let (input, lit) = literal(input)?;

    // frame.len is a record property, not a dissected field.
    if layer == "frame" && field == "len" {
        if let Literal::Int(v) = lit {
            if let Ok(value) = u64::try_from(v) {
                return Ok((input, Primitive::FrameLen { op, value }));
            }
        }
    }

    Ok((
        input,
        Primitive::FieldCompare {
            layer: layer.to_string(),
            field: field.to_string(),
            op,
            value: lit,
        },
    ))
}

// =============================================================================
// Token parsers
// =============================================================================

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
    ))(input)
}

fn port_number(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse::<u16>)(input)
}

fn prefix_len(input: &str) -> IResult<&str, u8> {
    map_res(digit1, str::parse::<u8>)(input)
}

/// Parse an IPv4 or IPv6 address.
fn ip_address(input: &str) -> IResult<&str, IpAddr> {
    map_res(
        take_while1(|c: char| c.is_ascii_hexdigit() || c == '.' || c == ':'),
        str::parse::<IpAddr>,
    )(input)
}

/// Parse a literal: quoted string, boolean, IP address, or integer.
fn literal(input: &str) -> IResult<&str, Literal> {
    alt((string_literal, bool_literal, ip_literal, int_literal))(input)
}

fn string_literal(input: &str) -> IResult<&str, Literal> {
    map(
        delimited(char('"'), take_while1(|c| c != '"'), char('"')),
        |s: &str| Literal::Str(s.to_string()),
    )(input)
}

fn bool_literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Bool(true), tag_no_case("true")),
        value(Literal::Bool(false), tag_no_case("false")),
    ))(input)
}

fn ip_literal(input: &str) -> IResult<&str, Literal> {
    map(ip_address, Literal::Ip)(input)
}

fn int_literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |s: &str| {
            i64::from_str_radix(s, 16).map(Literal::Int)
        }),
        map_res(
            pair(opt(char('-')), digit1),
            |(neg, digits): (Option<char>, &str)| {
                digits.parse::<i64>().map(|v| {
                    Literal::Int(if neg.is_some() { -v } else { v })
                })
            },
        ),
    ))(input)
}
