// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The mutable packet header consumed and rewritten by the translator.

use crate::ip::Protocol;
use crate::tcp::TcpFlags;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// Transport-level header summary for one IPv4 packet.
///
/// Produced by the I/O layer and handed to the translator, which rewrites
/// the source side (egress) or the destination side (ingress) in place. The
/// header is borrowed for the duration of one translation call and never
/// retained by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Source IPv4 address
    pub src_ip: Ipv4Addr,
    /// Source transport port
    pub src_port: u16,
    /// Destination IPv4 address
    pub dst_ip: Ipv4Addr,
    /// Destination transport port
    pub dst_port: u16,
    /// IP protocol number
    pub protocol: Protocol,
    /// TCP flags, when the I/O layer parsed them. `None` for UDP, and for
    /// I/O layers that stop at the port columns.
    pub tcp_flags: Option<TcpFlags>,
    /// Transport payload length in bytes. Informational; feeds per-flow
    /// byte accounting only.
    pub payload_len: usize,
}

impl PacketHeader {
    /// Generate a new [`PacketHeader`] with no TCP flags attached
    #[must_use]
    pub fn new(
        src_ip: Ipv4Addr,
        src_port: u16,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        protocol: Protocol,
        payload_len: usize,
    ) -> Self {
        Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            protocol,
            tcp_flags: None,
            payload_len,
        }
    }

    /// Attach TCP flags parsed from the transport header
    #[must_use]
    pub fn with_tcp_flags(mut self, flags: TcpFlags) -> Self {
        self.tcp_flags = Some(flags);
        self
    }
}

impl Display for PacketHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    //! Header builders for tests and demo drivers.

    use super::PacketHeader;
    use crate::ip::Protocol;
    use std::net::Ipv4Addr;

    fn parse(addr: &str) -> Ipv4Addr {
        addr.parse().unwrap_or_else(|_| panic!("invalid IPv4 literal {addr}"))
    }

    /// Build a TCP header from dotted-quad strings, with a small payload.
    ///
    /// # Panics
    ///
    /// Panics if either address is not a valid IPv4 literal.
    #[must_use]
    pub fn tcp_header(src: &str, src_port: u16, dst: &str, dst_port: u16) -> PacketHeader {
        PacketHeader::new(parse(src), src_port, parse(dst), dst_port, Protocol::TCP, 100)
    }

    /// Build a UDP header from dotted-quad strings, with a small payload.
    ///
    /// # Panics
    ///
    /// Panics if either address is not a valid IPv4 literal.
    #[must_use]
    pub fn udp_header(src: &str, src_port: u16, dst: &str, dst_port: u16) -> PacketHeader {
        PacketHeader::new(parse(src), src_port, parse(dst), dst_port, Protocol::UDP, 64)
    }
}
