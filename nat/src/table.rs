// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The dual-indexed flow table.
//!
//! Flow records live in a slab arena with stable indices and a free list;
//! the private-side and public-side indexes map structured keys to arena
//! indices. The two indexes move in lockstep: insertion and removal touch
//! both or neither, so every live flow is reachable from exactly one entry
//! in each.

use crate::state::FlowState;
use ahash::RandomState;
use net::ip::Protocol;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Instant;
use tracing::debug;

// Fixed seeds: hashing is a probe hint, equality on the full key decides.
fn hasher_state() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

/// Composite lookup key: one side's address and port plus the protocol.
///
/// The same shape keys both indexes: the subscriber 3-tuple on the
/// private side, the pool binding on the public side. The full tuple is
/// hashed and compared; nothing is packed into a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FlowKey {
    pub(crate) ip: Ipv4Addr,
    pub(crate) port: u16,
    pub(crate) proto: Protocol,
}

impl FlowKey {
    pub(crate) fn new(ip: Ipv4Addr, port: u16, proto: Protocol) -> Self {
        Self { ip, port, proto }
    }
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.ip, self.port, self.proto)
    }
}

/// Stable handle to a flow in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlowId(usize);

/// One live translation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Flow {
    /// Subscriber-side endpoint
    pub(crate) private: SocketAddrV4,
    /// Pool-side binding the subscriber appears as
    pub(crate) public: SocketAddrV4,
    pub(crate) proto: Protocol,
    pub(crate) state: FlowState,
    pub(crate) last_activity: Instant,
    pub(crate) packets: u64,
    pub(crate) bytes: u64,
}

impl Flow {
    pub(crate) fn new(
        private: SocketAddrV4,
        public: SocketAddrV4,
        proto: Protocol,
        state: FlowState,
        now: Instant,
    ) -> Self {
        Self {
            private,
            public,
            proto,
            state,
            last_activity: now,
            packets: 0,
            bytes: 0,
        }
    }

    pub(crate) fn private_key(&self) -> FlowKey {
        FlowKey::new(*self.private.ip(), self.private.port(), self.proto)
    }

    pub(crate) fn public_key(&self) -> FlowKey {
        FlowKey::new(*self.public.ip(), self.public.port(), self.proto)
    }

    /// Refresh the activity timestamp. Never moves backwards.
    pub(crate) fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Account one translated packet.
    pub(crate) fn record(&mut self, payload_len: usize) {
        self.packets += 1;
        self.bytes += u64::try_from(payload_len).unwrap_or(u64::MAX);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum FlowTableError {
    /// The capacity bound is reached
    #[error("flow table full (capacity {0})")]
    Full(usize),
    /// One of the flow's keys is already indexed
    #[error("duplicate flow key {0}")]
    DuplicateFlow(FlowKey),
}

#[derive(Debug)]
pub(crate) struct FlowTable {
    slots: Vec<Option<Flow>>,
    free: Vec<usize>,
    by_private: HashMap<FlowKey, usize, RandomState>,
    by_public: HashMap<FlowKey, usize, RandomState>,
    capacity: usize,
}

impl FlowTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_private: HashMap::with_hasher(hasher_state()),
            by_public: HashMap::with_hasher(hasher_state()),
            capacity,
        }
    }

    /// Number of live flows
    pub(crate) fn len(&self) -> usize {
        debug_assert_eq!(self.by_private.len(), self.by_public.len());
        self.by_private.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.len() < self.capacity
    }

    /// Install a flow under both of its keys.
    pub(crate) fn insert(&mut self, flow: Flow) -> Result<FlowId, FlowTableError> {
        if !self.has_capacity() {
            return Err(FlowTableError::Full(self.capacity));
        }
        let private_key = flow.private_key();
        let public_key = flow.public_key();
        if self.by_private.contains_key(&private_key) {
            return Err(FlowTableError::DuplicateFlow(private_key));
        }
        if self.by_public.contains_key(&public_key) {
            return Err(FlowTableError::DuplicateFlow(public_key));
        }
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(flow);
                idx
            }
            None => {
                self.slots.push(Some(flow));
                self.slots.len() - 1
            }
        };
        self.by_private.insert(private_key, idx);
        self.by_public.insert(public_key, idx);
        debug!("installed flow {private_key} <-> {public_key}");
        Ok(FlowId(idx))
    }

    pub(crate) fn find_private_mut(&mut self, key: &FlowKey) -> Option<&mut Flow> {
        let idx = *self.by_private.get(key)?;
        self.slots.get_mut(idx)?.as_mut()
    }

    pub(crate) fn find_public_mut(&mut self, key: &FlowKey) -> Option<&mut Flow> {
        let idx = *self.by_public.get(key)?;
        self.slots.get_mut(idx)?.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn find_private(&self, key: &FlowKey) -> Option<FlowId> {
        self.by_private.get(key).copied().map(FlowId)
    }

    #[cfg(test)]
    pub(crate) fn find_public(&self, key: &FlowKey) -> Option<FlowId> {
        self.by_public.get(key).copied().map(FlowId)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: FlowId) -> Option<&Flow> {
        self.slots.get(id.0)?.as_ref()
    }

    /// Drop a flow together with both of its index entries.
    pub(crate) fn remove(&mut self, id: FlowId) -> Option<Flow> {
        let flow = self.slots.get_mut(id.0)?.take()?;
        self.by_private.remove(&flow.private_key());
        self.by_public.remove(&flow.public_key());
        self.free.push(id.0);
        debug!(
            "removed flow {} <-> {}",
            flow.private_key(),
            flow.public_key()
        );
        Some(flow)
    }

    /// Live flows with their handles, in arena order.
    ///
    /// The sweeper collects handles first and removes afterwards, so
    /// iteration never observes a half-removed record.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (FlowId, &Flow)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|flow| (FlowId(idx), flow)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn flow(private: &str, public: &str, proto: Protocol) -> Flow {
        Flow::new(
            SocketAddrV4::from_str(private).unwrap(),
            SocketAddrV4::from_str(public).unwrap(),
            proto,
            FlowState::initial(proto),
            Instant::now(),
        )
    }

    #[test]
    fn test_insert_and_find_both_sides() {
        let mut table = FlowTable::new(16);
        let id = table
            .insert(flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::TCP))
            .unwrap();

        let private_key = FlowKey::new(Ipv4Addr::from_str("10.0.0.1").unwrap(), 40000, Protocol::TCP);
        let public_key =
            FlowKey::new(Ipv4Addr::from_str("203.0.113.1").unwrap(), 1024, Protocol::TCP);

        assert_eq!(table.find_private(&private_key), Some(id));
        assert_eq!(table.find_public(&public_key), Some(id));
        assert_eq!(table.len(), 1);

        // Same tuple under the other protocol is a different key.
        let udp_key = FlowKey::new(Ipv4Addr::from_str("10.0.0.1").unwrap(), 40000, Protocol::UDP);
        assert_eq!(table.find_private(&udp_key), None);
    }

    #[test]
    fn test_remove_clears_both_indexes() {
        let mut table = FlowTable::new(16);
        let id = table
            .insert(flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::TCP))
            .unwrap();
        let removed = table.remove(id).unwrap();

        assert_eq!(table.len(), 0);
        assert_eq!(table.find_private(&removed.private_key()), None);
        assert_eq!(table.find_public(&removed.public_key()), None);
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn test_capacity_bound() {
        let mut table = FlowTable::new(2);
        table
            .insert(flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::TCP))
            .unwrap();
        table
            .insert(flow("10.0.0.2:40000", "203.0.113.1:1025", Protocol::TCP))
            .unwrap();
        assert_eq!(
            table.insert(flow("10.0.0.3:40000", "203.0.113.1:1026", Protocol::TCP)),
            Err(FlowTableError::Full(2))
        );
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut table = FlowTable::new(16);
        table
            .insert(flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::TCP))
            .unwrap();
        // Same private side, fresh public side.
        assert!(matches!(
            table.insert(flow("10.0.0.1:40000", "203.0.113.1:1025", Protocol::TCP)),
            Err(FlowTableError::DuplicateFlow(_))
        ));
        // Fresh private side, same public side.
        assert!(matches!(
            table.insert(flow("10.0.0.2:40000", "203.0.113.1:1024", Protocol::TCP)),
            Err(FlowTableError::DuplicateFlow(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut table = FlowTable::new(16);
        let id = table
            .insert(flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::TCP))
            .unwrap();
        table.remove(id).unwrap();
        let id2 = table
            .insert(flow("10.0.0.2:40000", "203.0.113.1:1025", Protocol::TCP))
            .unwrap();
        assert_eq!(id, id2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn test_touch_is_monotone() {
        let now = Instant::now();
        let mut record = flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::UDP);
        record.touch(now);
        let later = now + std::time::Duration::from_secs(5);
        record.touch(later);
        assert_eq!(record.last_activity, later);
        // An older reading never rolls the timestamp back.
        record.touch(now);
        assert_eq!(record.last_activity, later);
    }

    #[test]
    fn test_packet_accounting() {
        let mut record = flow("10.0.0.1:40000", "203.0.113.1:1024", Protocol::UDP);
        record.record(100);
        record.record(50);
        assert_eq!(record.packets, 2);
        assert_eq!(record.bytes, 150);
    }
}
