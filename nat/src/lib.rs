// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]

//! Carrier-Grade NAT (CGNAT) translation engine
//!
//! This package multiplexes a large population of private-addressed
//! subscribers onto a small pool of public IPv4 addresses: the source
//! address and port of an egress packet are rewritten to a public binding,
//! and the rewrite is reversed for packets returning to that binding. The
//! engine owns the public port pool, the dual-indexed flow table, the
//! per-flow state machine and the idle-expiry sweeper; packet I/O and any
//! admin surface live outside and talk to it through
//! [`PacketHeader`](net::packet::PacketHeader) values and
//! [`StatsSnapshot`]s.
//!
//! # Example
//!
//! ```
//! use cgnat_nat::{Cgnat, CgnatConfig};
//! use net::ip::Protocol;
//! use net::packet::PacketHeader;
//!
//! let mut cgnat = Cgnat::new(CgnatConfig::default());
//! cgnat.add_public_ip("203.0.113.1").unwrap();
//!
//! let mut pkt = PacketHeader::new(
//!     "10.0.0.1".parse().unwrap(),
//!     40000,
//!     "8.8.8.8".parse().unwrap(),
//!     80,
//!     Protocol::TCP,
//!     100,
//! );
//! cgnat.translate_outbound(&mut pkt).unwrap();
//!
//! assert_eq!(pkt.src_ip, "203.0.113.1".parse::<std::net::Ipv4Addr>().unwrap());
//! assert!(pkt.src_port >= 1024);
//! ```
//!
//! # Limitations
//!
//! The package is subject to the following limitations:
//!
//! - IPv4 only (no NAT64, NAT46 or NAT66)
//! - TCP and UDP only; other protocols are rejected at the translation
//!   boundary and ICMP errors are not translated
//! - No hairpinning, no ALGs for protocols embedding addresses in their
//!   payload (FTP, SIP), no fragment reassembly
//! - No per-subscriber port quotas: a noisy subscriber can drain the pool
//! - Flow state is not persisted across restarts

mod config;
mod errors;
mod pool;
mod state;
mod stats;
mod table;
mod translator;


pub use config::{
    CgnatConfig, CgnatConfigBuilder, CgnatConfigBuilderError, ConfigError, MAX_FLOWS,
    MAX_PUBLIC_IPS, PORT_RANGE_END, PORT_RANGE_START, PortRange, TCP_TIMEOUT, UDP_TIMEOUT,
};
pub use errors::CgnatError;
pub use stats::{IpPortUsage, StatsSnapshot};
pub use translator::{Cgnat, SharedCgnat};
