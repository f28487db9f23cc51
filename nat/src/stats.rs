// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Statistics counters and the admin-facing snapshot.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// Lifetime counters kept by the engine. Port exhaustion events are counted
/// where they happen, in the pool.
#[derive(Debug, Default, Clone)]
pub(crate) struct StatsCounters {
    pub(crate) total_connections: u64,
    pub(crate) packets_translated: u64,
}

/// Port usage for one public IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpPortUsage {
    /// The public IP
    pub ip: Ipv4Addr,
    /// Ports bound to live flows
    pub ports_used: usize,
    /// Ports still free
    pub ports_available: usize,
}

/// Point-in-time view of the engine, shaped so an admin surface can
/// serialize it straight to JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Registered public IPs
    pub public_ips: usize,
    /// Allocatable ports across all public IPs
    pub total_ports: usize,
    /// Ports bound to live flows
    pub ports_in_use: usize,
    /// Ports still free
    pub ports_available: usize,
    /// Percentage of the pool in use
    pub port_utilization: f64,
    /// Flows created since start
    pub total_connections: u64,
    /// Live flows
    pub active_connections: u64,
    /// Packets rewritten in either direction
    pub packets_translated: u64,
    /// Failed allocations due to a full pool
    pub port_exhaustion_events: u64,
    /// Live flow records (always equals `active_connections`)
    pub flows: usize,
    /// Flow table capacity
    pub flow_capacity: usize,
    /// Percentage of the flow table in use
    pub flow_utilization: f64,
    /// Port usage per public IP, in registration order
    pub per_ip: Vec<IpPortUsage>,
    /// Live flows per connection state
    pub flow_states: BTreeMap<&'static str, u64>,
}

#[allow(clippy::cast_precision_loss)] // counts stay far below f64's integer limit
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl Display for StatsSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "========== CGNAT Statistics ==========")?;
        writeln!(f, "Public IPs configured: {}", self.public_ips)?;
        writeln!(f, "Total ports available: {}", self.total_ports)?;
        writeln!(
            f,
            "Ports currently in use: {} ({:.2}%)",
            self.ports_in_use, self.port_utilization
        )?;
        writeln!(f, "Total connections (lifetime): {}", self.total_connections)?;
        writeln!(f, "Active connections: {}", self.active_connections)?;
        writeln!(f, "Packets translated: {}", self.packets_translated)?;
        writeln!(f, "Port exhaustion events: {}", self.port_exhaustion_events)?;
        writeln!(
            f,
            "Flow table entries: {} / {} ({:.2}%)",
            self.flows, self.flow_capacity, self.flow_utilization
        )?;
        write!(f, "======================================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert!((percentage(0, 0) - 0.0).abs() < f64::EPSILON);
        assert!((percentage(1, 4) - 25.0).abs() < f64::EPSILON);
        assert!((percentage(64512, 64512) - 100.0).abs() < f64::EPSILON);
    }
}
