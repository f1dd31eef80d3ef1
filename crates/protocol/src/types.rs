//! USB addressing and endpoint type definitions
//!
//! These are the small value types shared by the decoder, the device model
//! and the transport contract.

use crate::descriptor::TRANSFER_TYPE_MASK;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device handle (bus position)
///
/// Identifies a physical device slot by bus number and device address. The
/// handle is only valid while the device stays attached; a device that
/// re-enumerates at a different address gets a different handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
}

impl DeviceHandle {
    pub const fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bus, self.address)
    }
}

/// Transfer direction, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction bit as it appears in endpoint addresses and bmRequestType
    pub const IN_BIT: u8 = 0x80;

    /// Decode the direction from bit 7 of an address or request type byte
    pub const fn from_bit(byte: u8) -> Self {
        if byte & Self::IN_BIT != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub const fn bit(self) -> u8 {
        match self {
            Direction::In => Self::IN_BIT,
            Direction::Out => 0x00,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("in"),
            Direction::Out => f.write_str("out"),
        }
    }
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    Bulk,
    Interrupt,
    Isochronous,
}

impl EndpointType {
    /// Map the low two bits of bmAttributes
    ///
    /// Anything that is neither bulk (2) nor interrupt (3) is reported as
    /// isochronous, control endpoints included.
    pub const fn from_attributes(attributes: u8) -> Self {
        match attributes & TRANSFER_TYPE_MASK {
            0x02 => EndpointType::Bulk,
            0x03 => EndpointType::Interrupt,
            _ => EndpointType::Isochronous,
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointType::Bulk => f.write_str("bulk"),
            EndpointType::Interrupt => f.write_str("interrupt"),
            EndpointType::Isochronous => f.write_str("isochronous"),
        }
    }
}

/// Build an endpoint address from its number and direction
pub const fn endpoint_address(number: u8, direction: Direction) -> u8 {
    (number & 0x0f) | direction.bit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        assert_eq!(DeviceHandle::new(1, 4).to_string(), "1.4");
        assert_ne!(DeviceHandle::new(1, 4), DeviceHandle::new(1, 5));
    }

    #[test]
    fn test_direction_bit() {
        assert_eq!(Direction::from_bit(0x81), Direction::In);
        assert_eq!(Direction::from_bit(0x01), Direction::Out);
        assert_eq!(Direction::In.bit(), 0x80);
        assert_eq!(Direction::Out.bit(), 0x00);
    }

    #[test]
    fn test_endpoint_type_from_attributes() {
        assert_eq!(EndpointType::from_attributes(0x02), EndpointType::Bulk);
        assert_eq!(EndpointType::from_attributes(0x03), EndpointType::Interrupt);
        assert_eq!(EndpointType::from_attributes(0x01), EndpointType::Isochronous);
        assert_eq!(EndpointType::from_attributes(0x00), EndpointType::Isochronous);
        // Upper bits (sync/usage) are ignored
        assert_eq!(EndpointType::from_attributes(0x0e), EndpointType::Bulk);
    }

    #[test]
    fn test_endpoint_address() {
        assert_eq!(endpoint_address(1, Direction::In), 0x81);
        assert_eq!(endpoint_address(2, Direction::Out), 0x02);
        assert_eq!(endpoint_address(0x1f, Direction::Out), 0x0f);
    }
}
