//! Binary Object Store (BOS) descriptor
//!
//! Layout:
//! ```text
//! [bLength][bDescriptorType=0x0F][wTotalLength: u16 LE][bNumDeviceCaps]
//! { [bLength][bDescriptorType=0x10][bDevCapabilityType][payload...] }*
//! ```
//!
//! The capability walk starts right after the fixed 5-byte header and stops
//! once `wTotalLength` bytes are consumed. Each capability's own `bLength`
//! decides where the next one starts.

use crate::descriptor::DT_BOS;
use crate::error::{DescriptorError, Result, ensure_len, ensure_type};
use byteorder::{ByteOrder, LittleEndian};

/// Size of the BOS header, also the length of the first GET_DESCRIPTOR read
pub const BOS_HEADER_SIZE: usize = 5;

/// Size of a device capability header
pub const CAPABILITY_HEADER_SIZE: usize = 3;

/// bDescriptorType of a device capability descriptor
pub const DT_DEVICE_CAPABILITY: u8 = 0x10;

/// bDevCapabilityType of a platform capability
pub const PLATFORM_CAPABILITY_TYPE: u8 = 0x05;

/// BOS is only defined for bcdUSB 2.0.1 and later
pub const BOS_MIN_USB_VERSION: u16 = 0x0201;

/// Decoded BOS descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BosDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub total_length: u16,
    pub num_capabilities: u8,
    pub capabilities: Vec<Capability>,
}

/// One device capability record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub length: u8,
    pub descriptor_type: u8,
    pub capability_type: u8,
    /// Type-specific payload, `length - 3` bytes
    pub data: Vec<u8>,
}

impl BosDescriptor {
    /// Read wTotalLength out of the 5-byte BOS header
    pub fn total_length_of(header: &[u8]) -> Result<u16> {
        ensure_len(header, BOS_HEADER_SIZE)?;
        ensure_type(header[1], DT_BOS)?;
        Ok(LittleEndian::read_u16(&header[2..4]))
    }

    /// Parse a complete BOS blob
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let total_length = Self::total_length_of(buf)?;
        let total = total_length as usize;
        ensure_len(buf, total)?;

        let mut capabilities = Vec::new();
        let mut offset = BOS_HEADER_SIZE;

        while offset < total {
            ensure_len(buf, offset + CAPABILITY_HEADER_SIZE)?;
            let length = buf[offset] as usize;
            if length < CAPABILITY_HEADER_SIZE || offset + length > total {
                return Err(DescriptorError::InvalidLength {
                    offset,
                    length: buf[offset],
                });
            }

            capabilities.push(Capability {
                length: buf[offset],
                descriptor_type: buf[offset + 1],
                capability_type: buf[offset + 2],
                data: buf[offset + CAPABILITY_HEADER_SIZE..offset + length].to_vec(),
            });

            offset += length;
        }

        Ok(Self {
            length: buf[0],
            descriptor_type: buf[1],
            total_length,
            num_capabilities: buf[4],
            capabilities,
        })
    }

    /// Re-encode into wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_length as usize);
        bytes.push(self.length);
        bytes.push(self.descriptor_type);
        bytes.extend_from_slice(&self.total_length.to_le_bytes());
        bytes.push(self.num_capabilities);

        for capability in &self.capabilities {
            bytes.push(capability.length);
            bytes.push(capability.descriptor_type);
            bytes.push(capability.capability_type);
            bytes.extend_from_slice(&capability.data);
        }

        bytes
    }
}

/// Decode a BOS blob, `None` when it cannot be walked
pub fn decode_bos(bytes: &[u8]) -> Option<BosDescriptor> {
    BosDescriptor::parse(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bos_with(capabilities: &[&[u8]]) -> Vec<u8> {
        let mut bytes = vec![5, DT_BOS, 0, 0, capabilities.len() as u8];
        for cap in capabilities {
            bytes.extend_from_slice(cap);
        }
        let total = bytes.len() as u16;
        bytes[2..4].copy_from_slice(&total.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_header_only() {
        let bos = decode_bos(&bos_with(&[])).unwrap();
        assert_eq!(bos.total_length, 5);
        assert_eq!(bos.num_capabilities, 0);
        assert!(bos.capabilities.is_empty());
    }

    #[test]
    fn test_parse_capabilities() {
        // USB 2.0 extension + a short platform capability
        let ext: &[u8] = &[7, DT_DEVICE_CAPABILITY, 0x02, 0x02, 0x00, 0x00, 0x00];
        let platform: &[u8] = &[5, DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE, 0xaa, 0xbb];
        let bos = decode_bos(&bos_with(&[ext, platform])).unwrap();

        assert_eq!(bos.capabilities.len(), 2);
        assert_eq!(bos.capabilities[0].capability_type, 0x02);
        assert_eq!(bos.capabilities[0].data.len(), 4);
        assert_eq!(bos.capabilities[1].capability_type, PLATFORM_CAPABILITY_TYPE);
        assert_eq!(bos.capabilities[1].data, vec![0xaa, 0xbb]);
    }

    #[test]
    fn test_walk_stops_at_total_length() {
        let platform: &[u8] = &[4, DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE, 0x01];
        let mut bytes = bos_with(&[platform]);
        // Trailing garbage beyond wTotalLength is ignored
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
        let bos = decode_bos(&bytes).unwrap();
        assert_eq!(bos.capabilities.len(), 1);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(decode_bos(&[5, DT_BOS, 5]).is_none());
        assert!(decode_bos(&[5, 0x02, 5, 0, 0]).is_none());

        // Capability claims more bytes than the descriptor holds
        let cap: &[u8] = &[9, DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE, 0];
        assert!(decode_bos(&bos_with(&[cap])).is_none());

        // Zero-length capability would never advance
        let cap: &[u8] = &[0, DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE];
        assert!(decode_bos(&bos_with(&[cap])).is_none());

        // Total length beyond the buffer
        let mut bytes = bos_with(&[]);
        bytes[2] = 40;
        assert!(decode_bos(&bytes).is_none());
    }

    #[test]
    fn test_to_bytes_matches_input() {
        let cap: &[u8] = &[6, DT_DEVICE_CAPABILITY, 0x03, 1, 2, 3];
        let bytes = bos_with(&[cap]);
        assert_eq!(decode_bos(&bytes).unwrap().to_bytes(), bytes);
    }
}
