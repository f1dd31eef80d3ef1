//! WebUSB platform capability and URL descriptor
//!
//! A WebUSB device advertises a platform capability (bDevCapabilityType 5)
//! inside its BOS descriptor. The capability payload is:
//!
//! ```text
//! [bReserved][PlatformCapabilityUUID: 16][bcdVersion: u16 LE][bVendorCode][iLandingPage]
//! ```
//!
//! The landing page is then fetched with a vendor request
//! (`bmRequestType = 0xC0`, `bRequest = bVendorCode`, `wValue = iLandingPage`,
//! `wIndex = 0x02`) which answers with a URL descriptor:
//!
//! ```text
//! [bLength][bDescriptorType][bScheme][URL: UTF-8...]
//! ```

use crate::bos::{Capability, PLATFORM_CAPABILITY_TYPE};
use crate::setup::ControlRequest;
use byteorder::{ByteOrder, LittleEndian};

/// Canonical form of the WebUSB platform capability UUID
pub const WEBUSB_UUID: &str = "3408b638-09a9-47a0-8bfd-a0768815b665";

/// Supported capability descriptor version (1.0)
pub const WEBUSB_CAPABILITY_VERSION: u16 = 0x0100;

/// bmRequestType of the GET_URL vendor request (IN, vendor, device)
pub const URL_REQUEST_TYPE: u8 = 0xc0;

/// wIndex of the GET_URL vendor request
pub const URL_REQUEST_INDEX: u16 = 0x02;

/// Buffer length requested for the URL descriptor
pub const URL_RESPONSE_LENGTH: u16 = 64;

/// Size of the URL descriptor header (length, type, scheme)
pub const URL_DESCRIPTOR_HEADER_SIZE: usize = 3;

pub const SCHEME_HTTP: u8 = 0;
pub const SCHEME_HTTPS: u8 = 1;
/// The URL string carries its own scheme
pub const SCHEME_EMBEDDED: u8 = 255;

// Offsets within the platform capability payload
const UUID_RANGE: std::ops::Range<usize> = 1..17;
const VERSION_RANGE: std::ops::Range<usize> = 17..19;
const VENDOR_CODE_OFFSET: usize = 19;
const LANDING_PAGE_OFFSET: usize = 20;

/// WebUSB platform capability found in a BOS descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebUsbCapability {
    pub version: u16,
    pub vendor_code: Option<u8>,
    pub landing_page: Option<u8>,
}

impl WebUsbCapability {
    /// Vendor request that fetches the landing page URL
    ///
    /// `None` when the capability is too short to carry a vendor code and
    /// landing page index, or when the index is 0 (no landing page).
    pub fn url_request(&self) -> Option<ControlRequest> {
        let vendor_code = self.vendor_code?;
        let landing_page = self.landing_page.filter(|&index| index != 0)?;

        Some(ControlRequest {
            request_type: URL_REQUEST_TYPE,
            request: vendor_code,
            value: landing_page as u16,
            index: URL_REQUEST_INDEX,
        })
    }
}

/// Render a 16-byte platform capability UUID in canonical form
///
/// The first three fields are stored little-endian, the remaining eight
/// bytes in wire order.
pub fn decode_uuid(bytes: &[u8; 16]) -> String {
    let data1 = LittleEndian::read_u32(&bytes[0..4]);
    let data2 = LittleEndian::read_u16(&bytes[4..6]);
    let data3 = LittleEndian::read_u16(&bytes[6..8]);
    let data4: String = bytes[8..10].iter().map(|b| format!("{:02x}", b)).collect();
    let data5: String = bytes[10..16].iter().map(|b| format!("{:02x}", b)).collect();

    format!(
        "{:08x}-{:04x}-{:04x}-{}-{}",
        data1, data2, data3, data4, data5
    )
}

/// Select the WebUSB capability among a device's capabilities
pub fn find_web_capability(capabilities: &[Capability]) -> Option<WebUsbCapability> {
    capabilities
        .iter()
        .filter(|capability| capability.capability_type == PLATFORM_CAPABILITY_TYPE)
        .find_map(|capability| parse_web_capability(&capability.data))
}

fn parse_web_capability(data: &[u8]) -> Option<WebUsbCapability> {
    let uuid: &[u8; 16] = data.get(UUID_RANGE)?.try_into().ok()?;
    let version = LittleEndian::read_u16(data.get(VERSION_RANGE)?);

    if decode_uuid(uuid) != WEBUSB_UUID || version != WEBUSB_CAPABILITY_VERSION {
        return None;
    }

    Some(WebUsbCapability {
        version,
        vendor_code: data.get(VENDOR_CODE_OFFSET).copied(),
        landing_page: data.get(LANDING_PAGE_OFFSET).copied(),
    })
}

/// Decode a URL descriptor response into a URL string
///
/// Everything after the 3-byte header up to the end of the received buffer
/// is the URL; the bLength byte is not consulted. Scheme 0 and 1 add
/// `http://` and `https://`, any other scheme leaves the string as is.
pub fn decode_url(bytes: &[u8]) -> Option<String> {
    if bytes.len() < URL_DESCRIPTOR_HEADER_SIZE {
        return None;
    }

    let body = String::from_utf8_lossy(&bytes[URL_DESCRIPTOR_HEADER_SIZE..]);
    let url = match bytes[2] {
        SCHEME_HTTP => format!("http://{}", body),
        SCHEME_HTTPS => format!("https://{}", body),
        _ => body.into_owned(),
    };

    Some(url)
}
