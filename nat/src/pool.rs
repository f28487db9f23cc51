// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Public IP registry and port-slot allocator.
//!
//! One dense bitmap per public IP tracks which ports are bound to flows. A
//! pool-level `ip_cursor` spreads allocations round-robin across IPs so no
//! single address drains while others sit idle, and a per-IP `port_cursor`
//! walks forward through the range so freshly freed low ports are not
//! immediately re-issued. Both cursors belong to the pool instance;
//! several engines can coexist in one process.

mod bitmap;

use crate::config::PortRange;
use bitmap::PortBitmap;
use net::port::{NatPort, NatPortError};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum PoolError {
    /// No free port on any registered public IP
    #[error("no free port on any public IP")]
    Exhausted,
    /// The pool already holds the configured maximum number of IPs
    #[error("cannot register more than {0} public IPs")]
    CapacityExceeded(usize),
    /// The IP is already registered
    #[error("public IP {0} already registered")]
    AlreadyRegistered(Ipv4Addr),
    /// A free slot mapped to a port outside the allocatable space
    #[error("failed to allocate port: {0}")]
    PortAllocationFailed(NatPortError),
}

/// One public IP's port space.
#[derive(Debug)]
struct IpPorts {
    addr: Ipv4Addr,
    ports: PortBitmap,
    /// Next offset to probe within the range
    port_cursor: usize,
}

/// The public-side address and port allocator.
#[derive(Debug)]
pub(crate) struct PortPool {
    ips: Vec<IpPorts>,
    /// Next IP index to probe
    ip_cursor: usize,
    range: PortRange,
    max_ips: usize,
    exhaustion_events: u64,
}

impl PortPool {
    pub(crate) fn new(range: PortRange, max_ips: usize) -> Self {
        Self {
            ips: Vec::with_capacity(max_ips),
            ip_cursor: 0,
            range,
            max_ips,
            exhaustion_events: 0,
        }
    }

    /// Register a public IP and mark its whole range free.
    pub(crate) fn add_public_ip(&mut self, addr: Ipv4Addr) -> Result<(), PoolError> {
        if self.ips.len() >= self.max_ips {
            return Err(PoolError::CapacityExceeded(self.max_ips));
        }
        if self.ips.iter().any(|entry| entry.addr == addr) {
            return Err(PoolError::AlreadyRegistered(addr));
        }
        self.ips.push(IpPorts {
            addr,
            ports: PortBitmap::new(self.range.num_ports()),
            port_cursor: 0,
        });
        Ok(())
    }

    /// Allocate an unused `(public IP, port)` slot.
    ///
    /// IPs are probed round-robin starting at `ip_cursor`; within an IP,
    /// ports are probed forward from that IP's `port_cursor`, wrapping
    /// modulo the range size. On success both cursors advance one past the
    /// chosen slot. A full sweep with no free slot counts one exhaustion
    /// event.
    pub(crate) fn allocate(&mut self) -> Result<(Ipv4Addr, NatPort), PoolError> {
        let num_ips = self.ips.len();
        if num_ips == 0 {
            return Err(PoolError::Exhausted);
        }
        for attempt in 0..num_ips {
            let idx = (self.ip_cursor + attempt) % num_ips;
            let entry = &mut self.ips[idx];
            if let Some(offset) = entry.ports.allocate_from(entry.port_cursor) {
                entry.port_cursor = (offset + 1) % self.range.num_ports();
                self.ip_cursor = (idx + 1) % num_ips;
                let port = NatPort::new_checked(self.range.port_at(offset))
                    .map_err(PoolError::PortAllocationFailed)?;
                return Ok((entry.addr, port));
            }
        }
        self.exhaustion_events += 1;
        warn!(
            "port pool exhausted: {num_ips} IPs, {} ports all in use",
            self.total_ports()
        );
        Err(PoolError::Exhausted)
    }

    /// Return a slot to the free set.
    ///
    /// Unknown IPs, out-of-range ports and already-free ports are ignored;
    /// release is idempotent. Callers are expected to pass only values they
    /// previously obtained from [`PortPool::allocate`].
    pub(crate) fn release(&mut self, addr: Ipv4Addr, port: u16) {
        let Some(offset) = self.range.offset_of(port) else {
            debug!("release of out-of-range port {addr}:{port} ignored");
            return;
        };
        let Some(entry) = self.ips.iter_mut().find(|entry| entry.addr == addr) else {
            debug!("release on unknown public IP {addr} ignored");
            return;
        };
        if !entry.ports.release(offset) {
            debug!("release of free port {addr}:{port} ignored");
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    pub(crate) fn num_ips(&self) -> usize {
        self.ips.len()
    }

    pub(crate) fn total_ports(&self) -> usize {
        self.ips.len() * self.range.num_ports()
    }

    pub(crate) fn ports_in_use(&self) -> usize {
        self.ips.iter().map(|entry| entry.ports.in_use()).sum()
    }

    pub(crate) fn exhaustion_events(&self) -> u64 {
        self.exhaustion_events
    }

    /// Ports in use per registered IP, in registration order.
    pub(crate) fn per_ip_usage(&self) -> Vec<(Ipv4Addr, usize)> {
        self.ips
            .iter()
            .map(|entry| (entry.addr, entry.ports.in_use()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn is_in_use(&self, addr: Ipv4Addr, port: u16) -> bool {
        let Some(offset) = self.range.offset_of(port) else {
            return false;
        };
        self.ips
            .iter()
            .find(|entry| entry.addr == addr)
            .is_some_and(|entry| entry.ports.is_set(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn addr_v4(addr: &str) -> Ipv4Addr {
        Ipv4Addr::from_str(addr).unwrap()
    }

    fn small_pool(num_ports: u16, max_ips: usize) -> PortPool {
        PortPool::new(PortRange::new(1024, 1024 + num_ports - 1).unwrap(), max_ips)
    }

    #[test]
    fn test_round_robin_across_ips() {
        let mut pool = small_pool(4, 10);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();
        pool.add_public_ip(addr_v4("203.0.113.2")).unwrap();

        let (ip1, p1) = pool.allocate().unwrap();
        let (ip2, p2) = pool.allocate().unwrap();
        let (ip3, p3) = pool.allocate().unwrap();

        assert_ne!(ip1, ip2);
        assert_eq!(ip1, ip3);
        assert_eq!(p1.as_u16(), 1024);
        assert_eq!(p2.as_u16(), 1024);
        assert_eq!(p3.as_u16(), 1025);
    }

    #[test]
    fn test_cursor_skips_freshly_freed_port() {
        let mut pool = small_pool(4, 10);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();

        let (addr, port) = pool.allocate().unwrap();
        assert_eq!(port.as_u16(), 1024);
        pool.release(addr, port.as_u16());
        // The cursor moved past 1024; the next allocation takes 1025.
        let (_, port) = pool.allocate().unwrap();
        assert_eq!(port.as_u16(), 1025);
    }

    #[test]
    fn test_cursor_wraps_to_freed_port() {
        let mut pool = small_pool(2, 10);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();

        let (addr, first) = pool.allocate().unwrap();
        let (_, second) = pool.allocate().unwrap();
        assert_eq!((first.as_u16(), second.as_u16()), (1024, 1025));
        pool.release(addr, 1024);
        let (_, third) = pool.allocate().unwrap();
        assert_eq!(third.as_u16(), 1024);
    }

    #[test]
    fn test_exhaustion_counts_events() {
        let mut pool = small_pool(2, 10);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();

        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert_eq!(pool.allocate(), Err(PoolError::Exhausted));
        assert_eq!(pool.allocate(), Err(PoolError::Exhausted));
        assert_eq!(pool.exhaustion_events(), 2);
        assert_eq!(pool.ports_in_use(), 2);
        assert_eq!(pool.total_ports(), 2);
    }

    #[test]
    fn test_ip_capacity_and_duplicates() {
        let mut pool = small_pool(4, 2);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();
        assert_eq!(
            pool.add_public_ip(addr_v4("203.0.113.1")),
            Err(PoolError::AlreadyRegistered(addr_v4("203.0.113.1")))
        );
        pool.add_public_ip(addr_v4("203.0.113.2")).unwrap();
        assert_eq!(
            pool.add_public_ip(addr_v4("203.0.113.3")),
            Err(PoolError::CapacityExceeded(2))
        );
    }

    #[test]
    fn test_release_is_defensive() {
        let mut pool = small_pool(4, 10);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();

        // None of these may disturb the pool.
        pool.release(addr_v4("198.51.100.9"), 1024);
        pool.release(addr_v4("203.0.113.1"), 80);
        pool.release(addr_v4("203.0.113.1"), 1025);
        assert_eq!(pool.ports_in_use(), 0);

        let (addr, port) = pool.allocate().unwrap();
        pool.release(addr, port.as_u16());
        pool.release(addr, port.as_u16());
        assert_eq!(pool.ports_in_use(), 0);
    }

    #[test]
    fn test_empty_pool_allocation_fails() {
        let mut pool = small_pool(4, 10);
        assert_eq!(pool.allocate(), Err(PoolError::Exhausted));
        // An empty pool is a configuration gap, not exhaustion.
        assert_eq!(pool.exhaustion_events(), 0);
    }

    #[test]
    fn test_per_ip_usage() {
        let mut pool = small_pool(4, 10);
        pool.add_public_ip(addr_v4("203.0.113.1")).unwrap();
        pool.add_public_ip(addr_v4("203.0.113.2")).unwrap();
        for _ in 0..3 {
            pool.allocate().unwrap();
        }
        let usage = pool.per_ip_usage();
        assert_eq!(usage[0], (addr_v4("203.0.113.1"), 2));
        assert_eq!(usage[1], (addr_v4("203.0.113.2"), 1));
    }
}
