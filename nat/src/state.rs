// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-flow connection state machine.

use net::ip::Protocol;
use net::tcp::TcpFlags;
use strum::{EnumIter, IntoStaticStr};

/// Connection state attached to a live flow.
///
/// TCP states follow the familiar handshake and teardown names; a UDP flow
/// has the single [`FlowState::UdpActive`] state and expires purely by idle
/// timeout. [`FlowState::Closed`] and [`FlowState::TimeWait`] are terminal:
/// the sweeper reclaims them without waiting for the idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum FlowState {
    /// TCP flow with no handshake progress observed yet
    New,
    SynSent,
    SynReceived,
    Established,
    FinWait,
    Closing,
    TimeWait,
    Closed,
    UdpActive,
}

impl FlowState {
    /// Initial state for a flow created by an outbound packet.
    pub(crate) fn initial(proto: Protocol) -> Self {
        if proto == Protocol::TCP {
            FlowState::SynSent
        } else {
            FlowState::UdpActive
        }
    }

    /// Terminal states are reclaimed by the next sweep regardless of how
    /// recently the flow saw traffic.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, FlowState::TimeWait | FlowState::Closed)
    }

    /// Advance on one observed packet, in either direction.
    ///
    /// With parsed TCP flags the transition follows the handshake and
    /// teardown signals, and RST forces [`FlowState::Closed`]. Without
    /// flags every packet nudges the state one step forward: long-lived
    /// connections settle in [`FlowState::Established`] and teardown
    /// states walk toward [`FlowState::Closed`].
    pub(crate) fn on_packet(self, flags: Option<TcpFlags>) -> Self {
        match flags {
            Some(flags) => self.on_flags(flags),
            None => self.advance(),
        }
    }

    fn advance(self) -> Self {
        match self {
            FlowState::New | FlowState::Closed => FlowState::SynSent,
            FlowState::SynSent | FlowState::SynReceived | FlowState::Established => {
                FlowState::Established
            }
            FlowState::FinWait => FlowState::Closing,
            FlowState::Closing => FlowState::TimeWait,
            FlowState::TimeWait => FlowState::Closed,
            FlowState::UdpActive => FlowState::UdpActive,
        }
    }

    fn on_flags(self, flags: TcpFlags) -> Self {
        if flags.contains(TcpFlags::RST) {
            return FlowState::Closed;
        }
        match self {
            FlowState::New | FlowState::Closed if flags.contains(TcpFlags::SYN) => {
                FlowState::SynSent
            }
            FlowState::SynSent if flags.contains(TcpFlags::SYN | TcpFlags::ACK) => {
                FlowState::SynReceived
            }
            FlowState::SynSent | FlowState::SynReceived if flags.contains(TcpFlags::ACK) => {
                FlowState::Established
            }
            FlowState::Established if flags.contains(TcpFlags::FIN) => FlowState::FinWait,
            FlowState::FinWait if flags.contains(TcpFlags::FIN) => FlowState::Closing,
            FlowState::Closing if flags.contains(TcpFlags::ACK) => FlowState::TimeWait,
            other => other,
        }
    }

    /// Name used by the stats snapshot and admin surfaces.
    pub(crate) fn name(self) -> &'static str {
        <&'static str>::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_states() {
        assert_eq!(FlowState::initial(Protocol::TCP), FlowState::SynSent);
        assert_eq!(FlowState::initial(Protocol::UDP), FlowState::UdpActive);
    }

    #[test]
    fn test_coarse_advance_walks_to_established() {
        let state = FlowState::SynSent;
        let state = state.on_packet(None);
        assert_eq!(state, FlowState::Established);
        // Established is a sink for data packets.
        assert_eq!(state.on_packet(None), FlowState::Established);
    }

    #[test]
    fn test_coarse_teardown_walk() {
        assert_eq!(FlowState::FinWait.on_packet(None), FlowState::Closing);
        assert_eq!(FlowState::Closing.on_packet(None), FlowState::TimeWait);
        assert_eq!(FlowState::TimeWait.on_packet(None), FlowState::Closed);
    }

    #[test]
    fn test_flag_driven_handshake() {
        let state = FlowState::SynSent;
        let state = state.on_packet(Some(TcpFlags::SYN | TcpFlags::ACK));
        assert_eq!(state, FlowState::SynReceived);
        let state = state.on_packet(Some(TcpFlags::ACK));
        assert_eq!(state, FlowState::Established);
    }

    #[test]
    fn test_flag_driven_teardown() {
        let state = FlowState::Established;
        let state = state.on_packet(Some(TcpFlags::FIN | TcpFlags::ACK));
        assert_eq!(state, FlowState::FinWait);
        let state = state.on_packet(Some(TcpFlags::FIN | TcpFlags::ACK));
        assert_eq!(state, FlowState::Closing);
        let state = state.on_packet(Some(TcpFlags::ACK));
        assert_eq!(state, FlowState::TimeWait);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_rst_closes_from_any_state() {
        for state in [
            FlowState::SynSent,
            FlowState::Established,
            FlowState::FinWait,
            FlowState::Closing,
        ] {
            assert_eq!(state.on_packet(Some(TcpFlags::RST)), FlowState::Closed);
        }
    }

    #[test]
    fn test_data_packets_do_not_tear_down() {
        // A pure data packet (ACK set) keeps Established where it is.
        assert_eq!(
            FlowState::Established.on_packet(Some(TcpFlags::ACK | TcpFlags::PSH)),
            FlowState::Established
        );
    }

    #[test]
    fn test_udp_state_is_stable() {
        assert_eq!(FlowState::UdpActive.on_packet(None), FlowState::UdpActive);
        assert!(!FlowState::UdpActive.is_terminal());
    }

    #[test]
    fn test_names_for_admin_surface() {
        assert_eq!(FlowState::SynSent.name(), "SYN_SENT");
        assert_eq!(FlowState::UdpActive.name(), "UDP_ACTIVE");
        assert_eq!(FlowState::TimeWait.name(), "TIME_WAIT");
    }
}
