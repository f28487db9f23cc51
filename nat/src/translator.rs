// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The translation façade: outbound and inbound rewrite, expiry sweep,
//! statistics.

use crate::config::CgnatConfig;
use crate::errors::CgnatError;
use crate::pool::PortPool;
use crate::state::FlowState;
use crate::stats::{IpPortUsage, StatsCounters, StatsSnapshot, percentage};
use crate::table::{Flow, FlowKey, FlowTable};
use net::ip::Protocol;
use net::packet::PacketHeader;
use net::tcp::TcpFlags;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Instant;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

/// The CGNAT translation engine.
///
/// Owns the public port pool, the dual-indexed flow table and the lifetime
/// counters. All operations take `&mut self`: one engine is one logical
/// single-writer datum, and callers that share it across threads wrap it in
/// [`SharedCgnat`] (or their own lock).
///
/// The mapping is endpoint-independent with respect to the destination:
/// repeat egress from one private `(ip, port, protocol)` 3-tuple reuses the
/// same public binding no matter where the packets go. There is no
/// per-subscriber port quota; a noisy subscriber can drain the pool.
#[derive(Debug)]
pub struct Cgnat {
    pub(crate) config: CgnatConfig,
    pub(crate) pool: PortPool,
    pub(crate) table: FlowTable,
    pub(crate) stats: StatsCounters,
}

impl Cgnat {
    /// Create an engine with the given tunables.
    #[must_use]
    pub fn new(config: CgnatConfig) -> Self {
        Self {
            pool: PortPool::new(config.port_range, config.max_public_ips),
            table: FlowTable::new(config.max_flows),
            stats: StatsCounters::default(),
            config,
        }
    }

    /// Register a public IP; its whole port range becomes allocatable.
    ///
    /// # Errors
    ///
    /// Returns [`CgnatError::InvalidAddress`] if `ip` is not an IPv4
    /// literal or is already registered, and
    /// [`CgnatError::CapacityExceeded`] if the pool already holds the
    /// configured maximum number of IPs.
    pub fn add_public_ip(&mut self, ip: &str) -> Result<(), CgnatError> {
        let addr = ip
            .parse()
            .map_err(|_| CgnatError::InvalidAddress(ip.to_string()))?;
        self.pool.add_public_ip(addr)?;
        info!(
            "added public IP {addr} ({} ports available)",
            self.config.port_range.num_ports()
        );
        Ok(())
    }

    /// Rewrite the source side of an egress packet to a public binding.
    ///
    /// A known private 3-tuple reuses its existing binding; an unknown one
    /// allocates a port and installs a flow in both indexes. On any error
    /// the header is left untouched.
    ///
    /// # Errors
    ///
    /// [`CgnatError::UnsupportedProtocol`] for anything but TCP and UDP,
    /// [`CgnatError::NoPublicIp`] before the first
    /// [`add_public_ip`](Cgnat::add_public_ip),
    /// [`CgnatError::TableFull`] when the flow capacity is reached, and
    /// [`CgnatError::PortExhaustion`] when no public port is free.
    pub fn translate_outbound(&mut self, pkt: &mut PacketHeader) -> Result<(), CgnatError> {
        if !pkt.protocol.is_supported() {
            return Err(CgnatError::UnsupportedProtocol(pkt.protocol));
        }
        if self.pool.is_empty() {
            return Err(CgnatError::NoPublicIp);
        }
        let now = Instant::now();
        let key = FlowKey::new(pkt.src_ip, pkt.src_port, pkt.protocol);

        // Hot path: the 3-tuple already has a binding.
        if let Some(flow) = self.table.find_private_mut(&key) {
            flow.touch(now);
            flow.state = flow.state.on_packet(tcp_flags_of(pkt));
            flow.record(pkt.payload_len);
            let public = flow.public;
            pkt.src_ip = *public.ip();
            pkt.src_port = public.port();
            self.stats.packets_translated += 1;
            return Ok(());
        }

        if !self.table.has_capacity() {
            warn!("flow table full at {} entries", self.table.capacity());
            return Err(CgnatError::TableFull(self.table.capacity()));
        }
        let (pub_ip, pub_port) = self.pool.allocate()?;
        let mut flow = Flow::new(
            SocketAddrV4::new(pkt.src_ip, pkt.src_port),
            SocketAddrV4::new(pub_ip, pub_port.as_u16()),
            pkt.protocol,
            FlowState::initial(pkt.protocol),
            now,
        );
        flow.record(pkt.payload_len);
        if let Err(err) = self.table.insert(flow) {
            // Undo the reservation; the header is untouched.
            self.pool.release(pub_ip, pub_port.as_u16());
            return Err(err.into());
        }
        pkt.src_ip = pub_ip;
        pkt.src_port = pub_port.as_u16();
        self.stats.total_connections += 1;
        self.stats.packets_translated += 1;
        debug!("new flow {key} -> {pub_ip}:{pub_port}");
        Ok(())
    }

    /// Rewrite the destination side of an ingress packet back to the
    /// subscriber it belongs to.
    ///
    /// Inbound never creates flows: the engine is not a port forwarder,
    /// and a packet with no matching binding is unsolicited.
    ///
    /// # Errors
    ///
    /// [`CgnatError::UnsupportedProtocol`] for anything but TCP and UDP,
    /// and [`CgnatError::NoMapping`] for unsolicited packets. `NoMapping`
    /// is the common case for Internet background noise; the I/O layer
    /// decides whether to drop quietly.
    pub fn translate_inbound(&mut self, pkt: &mut PacketHeader) -> Result<(), CgnatError> {
        if !pkt.protocol.is_supported() {
            return Err(CgnatError::UnsupportedProtocol(pkt.protocol));
        }
        let now = Instant::now();
        let key = FlowKey::new(pkt.dst_ip, pkt.dst_port, pkt.protocol);
        let flags = tcp_flags_of(pkt);
        let Some(flow) = self.table.find_public_mut(&key) else {
            debug!("unsolicited inbound to {key}");
            return Err(CgnatError::NoMapping);
        };
        flow.touch(now);
        flow.state = flow.state.on_packet(flags);
        flow.record(pkt.payload_len);
        let private = flow.private;
        pkt.dst_ip = *private.ip();
        pkt.dst_port = private.port();
        self.stats.packets_translated += 1;
        Ok(())
    }

    /// Reap idle and terminal flows, returning their ports to the pool.
    ///
    /// Returns the number of flows reclaimed. Invoked explicitly, by an
    /// admin surface or a periodic task.
    pub fn sweep_expired(&mut self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// [`sweep_expired`](Cgnat::sweep_expired) against an explicit clock
    /// reading, so an admin task or test can pick the sweep instant.
    ///
    /// A flow is reaped when its state is terminal (`CLOSED`, `TIME_WAIT`)
    /// or when it has been idle longer than its protocol's timeout.
    pub fn sweep_expired_at(&mut self, now: Instant) -> usize {
        let expired: Vec<_> = self
            .table
            .iter()
            .filter(|(_, flow)| {
                flow.state.is_terminal()
                    || now.saturating_duration_since(flow.last_activity)
                        > self.config.idle_timeout(flow.proto)
            })
            .map(|(id, _)| id)
            .collect();
        let mut reaped = 0;
        for id in expired {
            if let Some(flow) = self.table.remove(id) {
                debug!(
                    "reaped flow {} after {} packets / {} bytes",
                    flow.private_key(),
                    flow.packets,
                    flow.bytes
                );
                self.pool.release(*flow.public.ip(), flow.public.port());
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!("swept {reaped} expired flows");
        }
        reaped
    }

    /// Point-in-time statistics for the admin surface.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // usize counts fit u64 on supported targets
    pub fn stats(&self) -> StatsSnapshot {
        let total_ports = self.pool.total_ports();
        let ports_in_use = self.pool.ports_in_use();
        let flows = self.table.len();
        let num_range_ports = self.config.port_range.num_ports();

        let mut flow_states: BTreeMap<&'static str, u64> =
            FlowState::iter().map(|state| (state.name(), 0)).collect();
        for (_, flow) in self.table.iter() {
            if let Some(count) = flow_states.get_mut(flow.state.name()) {
                *count += 1;
            }
        }

        let per_ip = self
            .pool
            .per_ip_usage()
            .into_iter()
            .map(|(ip, ports_used)| IpPortUsage {
                ip,
                ports_used,
                ports_available: num_range_ports - ports_used,
            })
            .collect();

        StatsSnapshot {
            public_ips: self.pool.num_ips(),
            total_ports,
            ports_in_use,
            ports_available: total_ports - ports_in_use,
            port_utilization: percentage(ports_in_use, total_ports),
            total_connections: self.stats.total_connections,
            active_connections: flows as u64,
            packets_translated: self.stats.packets_translated,
            port_exhaustion_events: self.pool.exhaustion_events(),
            flows,
            flow_capacity: self.table.capacity(),
            flow_utilization: percentage(flows, self.table.capacity()),
            per_ip,
            flow_states,
        }
    }

    /// Engine tunables.
    #[must_use]
    pub fn config(&self) -> &CgnatConfig {
        &self.config
    }
}

fn tcp_flags_of(pkt: &PacketHeader) -> Option<TcpFlags> {
    if pkt.protocol == Protocol::TCP {
        pkt.tcp_flags
    } else {
        None
    }
}

/// Cloneable handle to an engine shared behind one coarse lock.
///
/// Every operation (both translate directions, the sweeper, admin changes)
/// serializes through the lock. A translation is one short critical section
/// with no blocking work inside, so the lock is held for bounded time.
#[derive(Debug, Clone)]
pub struct SharedCgnat {
    inner: Arc<Mutex<Cgnat>>,
}

impl SharedCgnat {
    /// Wrap a fresh engine.
    #[must_use]
    pub fn new(config: CgnatConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cgnat::new(config))),
        }
    }

    /// See [`Cgnat::add_public_ip`].
    ///
    /// # Errors
    ///
    /// Same as [`Cgnat::add_public_ip`].
    pub fn add_public_ip(&self, ip: &str) -> Result<(), CgnatError> {
        self.inner.lock().add_public_ip(ip)
    }

    /// See [`Cgnat::translate_outbound`].
    ///
    /// # Errors
    ///
    /// Same as [`Cgnat::translate_outbound`].
    pub fn translate_outbound(&self, pkt: &mut PacketHeader) -> Result<(), CgnatError> {
        self.inner.lock().translate_outbound(pkt)
    }

    /// See [`Cgnat::translate_inbound`].
    ///
    /// # Errors
    ///
    /// Same as [`Cgnat::translate_inbound`].
    pub fn translate_inbound(&self, pkt: &mut PacketHeader) -> Result<(), CgnatError> {
        self.inner.lock().translate_inbound(pkt)
    }

    /// See [`Cgnat::sweep_expired`].
    pub fn sweep_expired(&self) -> usize {
        self.inner.lock().sweep_expired()
    }

    /// See [`Cgnat::stats`].
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.lock().stats()
    }
}
