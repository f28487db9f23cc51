// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! TCP header flags.

use bitflags::bitflags;

bitflags! {
    /// The subset of TCP header flags the flow state machine inspects.
    ///
    /// An I/O layer that parses TCP headers attaches these to the
    /// [`PacketHeader`](crate::packet::PacketHeader); one that stops at the
    /// port columns leaves them out and the state machine falls back to
    /// coarse per-packet tracking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u8 {
        /// No more data from sender
        const FIN = 0x01;
        /// Synchronize sequence numbers
        const SYN = 0x02;
        /// Reset the connection
        const RST = 0x04;
        /// Push buffered data to the application
        const PSH = 0x08;
        /// Acknowledgment field is significant
        const ACK = 0x10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bits() {
        assert_eq!(TcpFlags::SYN.bits(), 0x02);
        assert_eq!((TcpFlags::SYN | TcpFlags::ACK).bits(), 0x12);
        assert_eq!(TcpFlags::from_bits_truncate(0xff), TcpFlags::all());
    }
}
