// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]

//! Typed packet and protocol primitives for the CGNAT translation engine.
//!
//! This crate owns the small vocabulary shared between the engine and the
//! I/O layer feeding it: transport [`Protocol`](ip::Protocol) numbers, the
//! range-checked [`NatPort`](port::NatPort) handed out by the public port
//! pool, TCP header [`TcpFlags`](tcp::TcpFlags), and the mutable
//! [`PacketHeader`](packet::PacketHeader) that a translation rewrites in
//! place.

pub mod ip;
pub mod packet;
pub mod port;
pub mod tcp;
