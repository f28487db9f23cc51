// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error taxonomy reported across the translation boundary.

use crate::pool::PoolError;
use crate::table::FlowTableError;
use net::ip::Protocol;

/// Errors surfaced to the I/O and admin layers.
///
/// Nothing here is fatal to the engine. [`PortExhaustion`](CgnatError) and
/// [`TableFull`](CgnatError) are operational conditions that clear as flows
/// are reaped, and [`NoMapping`](CgnatError) is the expected outcome for
/// unsolicited inbound packets. The engine never drops a packet silently:
/// it reports the condition and the I/O layer decides what to do with the
/// packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CgnatError {
    /// Outbound translation attempted before any public IP was added
    #[error("no public IP configured")]
    NoPublicIp,
    /// Every port on every public IP is bound to a live flow
    #[error("port pool exhausted")]
    PortExhaustion,
    /// The flow table reached its configured capacity
    #[error("flow table full (capacity {0})")]
    TableFull(usize),
    /// Inbound packet with no matching flow
    #[error("no mapping for inbound packet")]
    NoMapping,
    /// Admin input was not a usable IPv4 address
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),
    /// The pool already holds the maximum number of public IPs
    #[error("cannot add more than {0} public IPs")]
    CapacityExceeded(usize),
    /// Protocol other than TCP or UDP
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(Protocol),
    // Something has gone wrong, but user input or packet input are not
    // responsible. We hit an implementation bug.
    /// Internal engine inconsistency
    #[error("internal issue: {0}")]
    Internal(String),
}

impl From<PoolError> for CgnatError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted => CgnatError::PortExhaustion,
            PoolError::CapacityExceeded(max) => CgnatError::CapacityExceeded(max),
            PoolError::AlreadyRegistered(ip) => CgnatError::InvalidAddress(ip.to_string()),
            PoolError::PortAllocationFailed(err) => CgnatError::Internal(err.to_string()),
        }
    }
}

impl From<FlowTableError> for CgnatError {
    fn from(err: FlowTableError) -> Self {
        match err {
            FlowTableError::Full(capacity) => CgnatError::TableFull(capacity),
            FlowTableError::DuplicateFlow(key) => {
                CgnatError::Internal(format!("duplicate flow key {key}"))
            }
        }
    }
}
