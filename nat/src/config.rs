// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Engine configuration.

use derive_builder::Builder;
use net::ip::Protocol;
use net::port::NatPort;
use std::time::Duration;

/// Most public IPs a pool will hold
pub const MAX_PUBLIC_IPS: usize = 10;

/// First allocatable source port
pub const PORT_RANGE_START: u16 = 1024;

/// Last allocatable source port
pub const PORT_RANGE_END: u16 = 65535;

/// Flow table capacity
pub const MAX_FLOWS: usize = 50_000;

/// Idle timeout for TCP flows
pub const TCP_TIMEOUT: Duration = Duration::from_secs(300);

/// Idle timeout for UDP flows
pub const UDP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigError {
    /// The range is inverted or dips into the reserved ports below
    /// [`NatPort::MIN`]
    #[error("invalid port range ({0}..={1})")]
    InvalidPortRange(u16, u16),
}

/// Contiguous inclusive range of allocatable source ports, applied to every
/// public IP in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Create a range covering `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPortRange`] if `end < start` or if
    /// `start` lies below [`NatPort::MIN`]: translations never use the
    /// well-known and registered port space.
    pub const fn new(start: u16, end: u16) -> Result<PortRange, ConfigError> {
        if start < NatPort::MIN || end < start {
            return Err(ConfigError::InvalidPortRange(start, end));
        }
        Ok(Self { start, end })
    }

    /// First port in the range
    #[must_use]
    pub const fn start(self) -> u16 {
        self.start
    }

    /// Last port in the range
    #[must_use]
    pub const fn end(self) -> u16 {
        self.end
    }

    /// Number of ports in the range
    #[must_use]
    pub fn num_ports(self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// True if `port` lies within the range
    #[must_use]
    pub fn contains(self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Zero-based offset of `port` within the range
    pub(crate) fn offset_of(self, port: u16) -> Option<usize> {
        if self.contains(port) {
            Some(usize::from(port - self.start))
        } else {
            None
        }
    }

    /// Port at zero-based `offset`. Callers keep offsets below
    /// [`PortRange::num_ports`].
    #[allow(clippy::cast_possible_truncation)] // offsets are bounded by the range size
    pub(crate) fn port_at(self, offset: usize) -> u16 {
        debug_assert!(offset < self.num_ports());
        self.start + offset as u16
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: PORT_RANGE_START,
            end: PORT_RANGE_END,
        }
    }
}

/// Engine-wide tunables.
///
/// [`CgnatConfig::default`] reproduces the reference deployment: ten public
/// IPs at most, the full `1024..=65535` port range on each, 50 000 flows,
/// and the usual 300 s / 60 s idle timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "CgnatConfigBuilder::validate"))]
pub struct CgnatConfig {
    /// Most public IPs the pool accepts
    #[builder(default = "MAX_PUBLIC_IPS")]
    pub max_public_ips: usize,
    /// Allocatable source-port range, per public IP
    #[builder(default)]
    pub port_range: PortRange,
    /// Flow table capacity
    #[builder(default = "MAX_FLOWS")]
    pub max_flows: usize,
    /// Idle timeout for TCP flows
    #[builder(default = "TCP_TIMEOUT")]
    pub tcp_idle_timeout: Duration,
    /// Idle timeout for UDP flows
    #[builder(default = "UDP_TIMEOUT")]
    pub udp_idle_timeout: Duration,
}

impl CgnatConfig {
    /// Start building a config from the defaults
    #[must_use]
    pub fn builder() -> CgnatConfigBuilder {
        CgnatConfigBuilder::default()
    }

    /// Idle timeout applied to flows of `proto`
    #[must_use]
    pub fn idle_timeout(&self, proto: Protocol) -> Duration {
        if proto == Protocol::TCP {
            self.tcp_idle_timeout
        } else {
            self.udp_idle_timeout
        }
    }
}

impl Default for CgnatConfig {
    fn default() -> Self {
        Self {
            max_public_ips: MAX_PUBLIC_IPS,
            port_range: PortRange::default(),
            max_flows: MAX_FLOWS,
            tcp_idle_timeout: TCP_TIMEOUT,
            udp_idle_timeout: UDP_TIMEOUT,
        }
    }
}

impl CgnatConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_public_ips == Some(0) {
            return Err("max_public_ips must be non-zero".to_string());
        }
        if self.max_flows == Some(0) {
            return Err("max_flows must be non-zero".to_string());
        }
        Ok(())
    }
}
