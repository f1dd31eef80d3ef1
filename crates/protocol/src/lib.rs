//! USB descriptor decoding for WebUSB hosts
//!
//! This crate turns raw descriptor bytes read from a device into typed
//! values: device and configuration descriptors, the Binary Object Store
//! (BOS), the WebUSB platform capability and its landing page URL. It also
//! defines the control request shapes the session layer hands to a
//! transport. Nothing here performs I/O.
//!
//! # Example
//!
//! ```
//! use protocol::{decode_bos, decode_url, find_web_capability};
//!
//! // BOS header with no capabilities
//! let bos = decode_bos(&[5, 0x0f, 5, 0, 0]).unwrap();
//! assert!(find_web_capability(&bos.capabilities).is_none());
//!
//! // URL descriptor with the https scheme
//! let url = decode_url(&[9, 3, 1, b'e', b'x', b'.', b'o', b'r', b'g']);
//! assert_eq!(url.as_deref(), Some("https://ex.org"));
//! ```

pub mod bos;
pub mod descriptor;
pub mod error;
pub mod setup;
pub mod types;
pub mod version;
pub mod webusb;

pub use bos::{BosDescriptor, Capability, decode_bos};
pub use descriptor::{
    ConfigurationDescriptor, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
};
pub use error::{DescriptorError, Result};
pub use setup::{ControlRequest, ControlSetup, Recipient, RequestType};
pub use types::{DeviceHandle, Direction, EndpointType, endpoint_address};
pub use version::UsbVersion;
pub use webusb::{WebUsbCapability, decode_url, decode_uuid, find_web_capability};
