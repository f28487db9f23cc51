// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Allocatable NAT port numbers.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum NatPortError {
    /// The port lies below the allocatable range
    #[error("reserved port ({0})")]
    ReservedPort(u16),
}

/// A source port handed out by the public port pool.
///
/// Allocatable ports live in `1024..=65535`; the well-known and registered
/// range below [`NatPort::MIN`] is never used for translations.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NatPort(u16);

impl NatPort {
    /// Lowest allocatable port
    pub const MIN: u16 = 1024;

    /// Create a [`NatPort`].
    ///
    /// # Errors
    ///
    /// Returns [`NatPortError::ReservedPort`] if `port` is below
    /// [`NatPort::MIN`].
    pub const fn new_checked(port: u16) -> Result<NatPort, NatPortError> {
        if port < Self::MIN {
            return Err(NatPortError::ReservedPort(port));
        }
        Ok(Self(port))
    }

    /// Return the port as a plain `u16`
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl From<NatPort> for u16 {
    fn from(port: NatPort) -> Self {
        port.as_u16()
    }
}

impl TryFrom<u16> for NatPort {
    type Error = NatPortError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        Self::new_checked(port)
    }
}

impl Display for NatPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        assert!(NatPort::new_checked(0).is_err());
        assert!(NatPort::new_checked(1023).is_err());
        assert_eq!(
            NatPort::new_checked(1024).map(NatPort::as_u16),
            Ok(NatPort::MIN)
        );
        assert_eq!(
            NatPort::new_checked(u16::MAX).map(NatPort::as_u16),
            Ok(u16::MAX)
        );
    }

    #[test]
    fn test_conversions() {
        let port = NatPort::try_from(8080).unwrap();
        assert_eq!(u16::from(port), 8080);
        assert_eq!(port.to_string(), "8080");
    }
}
