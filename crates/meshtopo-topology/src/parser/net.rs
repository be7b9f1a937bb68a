//! Parsers for network primitives built on `nom`.
//!
//! Covers IPv4 addresses, CIDR blocks, `host[:port]` endpoints, and firewall
//! port specifications. Every entry point requires the whole input to be
//! consumed.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{all_consuming, opt},
    sequence::{delimited, preceded},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Cidr {
    /// Creates a CIDR, rejecting prefix lengths above 32.
    #[must_use]
    pub const fn new(addr: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        Some(Self { addr, prefix_len })
    }

    /// Address as written (host bits are kept).
    #[must_use]
    pub const fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// Number of network bits.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    /// Network address with host bits cleared.
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    /// Returns `true` if `ip` lies inside this network.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.network())
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = NetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_cidr(s)
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A `host[:port]` endpoint as written by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or address, without IPv6 brackets.
    pub host: String,
    /// Explicit port, if any.
    pub port: Option<u16>,
}

/// Port selector of a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelector {
    /// Every port.
    Any,
    /// A single port.
    Single(u16),
    /// An inclusive range.
    Range(u16, u16),
}

/// Failure to parse a network primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} \"{input}\"")]
pub struct NetParseError {
    /// What was being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub input: String,
}

impl NetParseError {
    fn new(kind: &'static str, input: &str) -> Self {
        Self {
            kind,
            input: input.to_string(),
        }
    }
}

fn number<T: FromStr>(input: &str) -> IResult<&str, T> {
    let (rest, digits) = digit1(input)?;
    let value = digits.parse().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
    })?;
    Ok((rest, value))
}

fn ipv4(input: &str) -> IResult<&str, Ipv4Addr> {
    let (input, a) = number::<u8>(input)?;
    let (input, _) = char('.')(input)?;
    let (input, b) = number::<u8>(input)?;
    let (input, _) = char('.')(input)?;
    let (input, c) = number::<u8>(input)?;
    let (input, _) = char('.')(input)?;
    let (input, d) = number::<u8>(input)?;
    Ok((input, Ipv4Addr::new(a, b, c, d)))
}

fn cidr(input: &str) -> IResult<&str, (Ipv4Addr, u8)> {
    let (input, addr) = ipv4(input)?;
    let (input, prefix) = preceded(char('/'), number::<u8>).parse(input)?;
    Ok((input, (addr, prefix)))
}

fn bracketed_host(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_while1(|c: char| c != ']'), char(']')).parse(input)
}

fn plain_host(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ':' && c != '[' && c != ']' && !c.is_whitespace())(input)
}

fn endpoint(input: &str) -> IResult<&str, Endpoint> {
    let (input, host) = if input.starts_with('[') {
        bracketed_host(input)?
    } else {
        plain_host(input)?
    };
    let (input, port) = opt(preceded(char(':'), number::<u16>)).parse(input)?;
    Ok((
        input,
        Endpoint {
            host: host.to_string(),
            port,
        },
    ))
}

fn port_selector(input: &str) -> IResult<&str, PortSelector> {
    if let Some(rest) = input.strip_prefix(meshtopo_common::constants::ANY) {
        return Ok((rest, PortSelector::Any));
    }
    let (input, low) = number::<u16>(input)?;
    let (input, high) = opt(preceded(char('-'), number::<u16>)).parse(input)?;
    Ok((input, high.map_or(PortSelector::Single(low), |h| PortSelector::Range(low, h))))
}

/// Parses a dotted-quad IPv4 address.
///
/// # Errors
///
/// Returns an error if the input is not exactly one IPv4 address.
pub fn parse_ipv4(input: &str) -> Result<Ipv4Addr, NetParseError> {
    all_consuming(ipv4)
        .parse(input.trim())
        .map(|(_, ip)| ip)
        .map_err(|_| NetParseError::new("IPv4 address", input))
}

/// Parses `a.b.c.d/len` with `len <= 32`.
///
/// # Errors
///
/// Returns an error if the input is not a valid IPv4 CIDR.
pub fn parse_cidr(input: &str) -> Result<Cidr, NetParseError> {
    let (_, (addr, prefix)) = all_consuming(cidr)
        .parse(input.trim())
        .map_err(|_| NetParseError::new("CIDR", input))?;
    Cidr::new(addr, prefix).ok_or_else(|| NetParseError::new("CIDR", input))
}

/// Parses `host`, `host:port`, or `[v6]:port`.
///
/// # Errors
///
/// Returns an error for empty hosts, bare IPv6 addresses, or invalid ports.
pub fn parse_endpoint(input: &str) -> Result<Endpoint, NetParseError> {
    all_consuming(endpoint)
        .parse(input.trim())
        .map(|(_, ep)| ep)
        .map_err(|_| NetParseError::new("endpoint", input))
}

/// Parses a firewall port selector: `any`, `N`, or `LOW-HIGH`.
///
/// # Errors
///
/// Returns an error if the input is malformed or the range is inverted.
pub fn parse_port_selector(input: &str) -> Result<PortSelector, NetParseError> {
    let (_, selector) = all_consuming(port_selector)
        .parse(input.trim())
        .map_err(|_| NetParseError::new("port", input))?;
    match selector {
        PortSelector::Range(low, high) if low > high => Err(NetParseError::new("port", input)),
        other => Ok(other),
    }
}
