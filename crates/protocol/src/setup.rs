//! Control transfer setup packets
//!
//! [`ControlSetup`] is the caller-facing description of a control request
//! (recipient, request type class, request, value, index).
//! [`ControlRequest`] is its wire form with bmRequestType already computed,
//! which is what the transport receives.

use crate::descriptor::{CLEAR_FEATURE, ENDPOINT_HALT, GET_CONFIGURATION, GET_DESCRIPTOR};
use crate::types::Direction;
use serde::{Deserialize, Serialize};

/// Recipient bits of bmRequestType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

impl Recipient {
    pub const fn code(self) -> u8 {
        match self {
            Recipient::Device => 0x00,
            Recipient::Interface => 0x01,
            Recipient::Endpoint => 0x02,
            Recipient::Other => 0x03,
        }
    }
}

/// Type bits of bmRequestType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
}

impl RequestType {
    pub const fn code(self) -> u8 {
        match self {
            RequestType::Standard => 0x00,
            RequestType::Class => 0x20,
            RequestType::Vendor => 0x40,
        }
    }
}

/// Control transfer parameters as supplied by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSetup {
    pub request_type: RequestType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlSetup {
    /// Compute bmRequestType for the given direction
    pub const fn bm_request_type(&self, direction: Direction) -> u8 {
        self.recipient.code() | self.request_type.code() | direction.bit()
    }

    pub const fn to_request(&self, direction: Direction) -> ControlRequest {
        ControlRequest {
            request_type: self.bm_request_type(direction),
            request: self.request,
            value: self.value,
            index: self.index,
        }
    }

    /// Interface targeted by an interface-recipient request (low 8 bits)
    pub const fn target_interface(&self) -> u8 {
        (self.index & 0xff) as u8
    }

    /// Endpoint number targeted by an endpoint-recipient request (low 4 bits)
    pub const fn target_endpoint(&self) -> u8 {
        (self.index & 0x0f) as u8
    }

    pub const fn target_direction(&self) -> Direction {
        Direction::from_bit(self.index as u8)
    }
}

/// Wire-level control request handed to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// Standard GET_DESCRIPTOR addressed to the device
    pub const fn get_descriptor(descriptor_type: u8, index: u8) -> Self {
        Self {
            request_type: Direction::IN_BIT,
            request: GET_DESCRIPTOR,
            value: ((descriptor_type as u16) << 8) | index as u16,
            index: 0,
        }
    }

    /// Standard GET_CONFIGURATION, one byte response
    pub const fn get_configuration() -> Self {
        Self {
            request_type: Direction::IN_BIT,
            request: GET_CONFIGURATION,
            value: 0,
            index: 0,
        }
    }

    /// Standard CLEAR_FEATURE(ENDPOINT_HALT) for an endpoint address
    pub const fn clear_halt(endpoint_address: u8) -> Self {
        Self {
            request_type: Recipient::Endpoint.code() | RequestType::Standard.code(),
            request: CLEAR_FEATURE,
            value: ENDPOINT_HALT,
            index: endpoint_address as u16,
        }
    }

    pub const fn direction(&self) -> Direction {
        Direction::from_bit(self.request_type)
    }
}
