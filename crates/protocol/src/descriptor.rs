//! Standard USB descriptors
//!
//! Parsers for the device descriptor and the full configuration descriptor
//! blob (configuration header followed by interface and endpoint
//! descriptors). Class-specific descriptors interleaved in the blob are
//! skipped.

use crate::error::{DescriptorError, Result, ensure_len, ensure_type};
use crate::types::{Direction, EndpointType};
use byteorder::{ByteOrder, LittleEndian};

/// Standard request codes
pub const GET_DESCRIPTOR: u8 = 0x06;
pub const GET_CONFIGURATION: u8 = 0x08;
pub const CLEAR_FEATURE: u8 = 0x01;

/// Feature selector for CLEAR_FEATURE on an endpoint
pub const ENDPOINT_HALT: u16 = 0x00;

/// Descriptor type codes
pub const DT_DEVICE: u8 = 0x01;
pub const DT_CONFIGURATION: u8 = 0x02;
pub const DT_STRING: u8 = 0x03;
pub const DT_INTERFACE: u8 = 0x04;
pub const DT_ENDPOINT: u8 = 0x05;
pub const DT_BOS: u8 = 0x0f;

pub const DEVICE_DESCRIPTOR_SIZE: usize = 18;
pub const CONFIGURATION_HEADER_SIZE: usize = 9;
pub const INTERFACE_DESCRIPTOR_SIZE: usize = 9;
pub const ENDPOINT_DESCRIPTOR_SIZE: usize = 7;

/// Mask selecting the transfer type bits of bmAttributes
pub const TRANSFER_TYPE_MASK: u8 = 0x03;

/// Device descriptor (18 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, DEVICE_DESCRIPTOR_SIZE)?;
        ensure_type(buf[1], DT_DEVICE)?;

        Ok(Self {
            bcd_usb: LittleEndian::read_u16(&buf[2..4]),
            device_class: buf[4],
            device_subclass: buf[5],
            device_protocol: buf[6],
            max_packet_size0: buf[7],
            vendor_id: LittleEndian::read_u16(&buf[8..10]),
            product_id: LittleEndian::read_u16(&buf[10..12]),
            bcd_device: LittleEndian::read_u16(&buf[12..14]),
            manufacturer_index: buf[14],
            product_index: buf[15],
            serial_number_index: buf[16],
            num_configurations: buf[17],
        })
    }
}

/// Configuration descriptor with its nested interface descriptors
///
/// `interfaces` is flat: every alternate setting is its own entry, in the
/// order the device reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_index: u8,
    pub attributes: u8,
    pub max_power: u8,
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl ConfigurationDescriptor {
    /// Read wTotalLength out of the 9-byte configuration header
    pub fn total_length_of(header: &[u8]) -> Result<u16> {
        ensure_len(header, CONFIGURATION_HEADER_SIZE)?;
        ensure_type(header[1], DT_CONFIGURATION)?;
        Ok(LittleEndian::read_u16(&header[2..4]))
    }

    /// Parse a complete configuration blob (`wTotalLength` bytes)
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let total_length = Self::total_length_of(buf)?;
        let total = total_length as usize;
        ensure_len(buf, total)?;

        let header_len = buf[0] as usize;
        if header_len < CONFIGURATION_HEADER_SIZE || header_len > total {
            return Err(DescriptorError::InvalidLength {
                offset: 0,
                length: buf[0],
            });
        }

        let mut interfaces: Vec<InterfaceDescriptor> = Vec::new();
        let mut offset = header_len;

        while offset < total {
            let length = buf[offset] as usize;
            if length < 2 || offset + length > total {
                return Err(DescriptorError::InvalidLength {
                    offset,
                    length: buf[offset],
                });
            }

            let body = &buf[offset..offset + length];
            match body[1] {
                DT_INTERFACE => interfaces.push(InterfaceDescriptor::parse(body)?),
                DT_ENDPOINT => {
                    let endpoint = EndpointDescriptor::parse(body)?;
                    interfaces
                        .last_mut()
                        .ok_or(DescriptorError::OrphanEndpoint { offset })?
                        .endpoints
                        .push(endpoint);
                }
                // Class-specific and vendor descriptors are not modelled
                _ => {}
            }

            offset += length;
        }

        Ok(Self {
            total_length,
            num_interfaces: buf[4],
            configuration_value: buf[5],
            configuration_index: buf[6],
            attributes: buf[7],
            max_power: buf[8],
            interfaces,
        })
    }
}

/// One interface descriptor (a single alternate setting)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_index: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, INTERFACE_DESCRIPTOR_SIZE)?;
        Ok(Self {
            interface_number: buf[2],
            alternate_setting: buf[3],
            num_endpoints: buf[4],
            interface_class: buf[5],
            interface_subclass: buf[6],
            interface_protocol: buf[7],
            interface_index: buf[8],
            endpoints: Vec::new(),
        })
    }
}

/// Endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, ENDPOINT_DESCRIPTOR_SIZE)?;
        Ok(Self {
            address: buf[2],
            attributes: buf[3],
            max_packet_size: LittleEndian::read_u16(&buf[4..6]),
            interval: buf[6],
        })
    }

    pub fn direction(&self) -> Direction {
        Direction::from_bit(self.address)
    }

    /// Endpoint number with the direction bit stripped
    pub fn number(&self) -> u8 {
        self.address & 0x0f
    }

    pub fn endpoint_type(&self) -> EndpointType {
        EndpointType::from_attributes(self.attributes)
    }
}
