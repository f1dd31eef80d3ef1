//! Test utilities for the session layer
//!
//! Provides a scripted in-memory [`Transport`], raw descriptor builders and
//! ready-made device models.
//!
//! # Example
//!
//! ```
//! use session::test_utils::{MockDevice, MockTransport};
//! use session::Session;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = Arc::new(MockTransport::new());
//! transport.add_device(MockDevice::new(1, 2));
//!
//! let session = Session::new(transport.clone());
//! let devices = session.list_devices().await.unwrap();
//! assert_eq!(devices[0].product_name.as_deref(), Some("Widget"));
//! # }
//! ```

use crate::error::TransportError;
use crate::model::{AlternateInterface, Configuration, Device, Endpoint, Interface};
use crate::session::{Session, SessionOptions};
use crate::transport::{Transport, TransportResult};
use async_trait::async_trait;
use common::RetryPolicy;
use protocol::bos::{DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE};
use protocol::descriptor::{
    DT_BOS, DT_CONFIGURATION, DT_DEVICE, DT_ENDPOINT, DT_INTERFACE, GET_CONFIGURATION,
    GET_DESCRIPTOR,
};
use protocol::webusb::{URL_REQUEST_INDEX, URL_REQUEST_TYPE};
use protocol::{ControlRequest, DeviceHandle, Direction, EndpointType, RequestType, UsbVersion};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// WebUSB platform capability UUID as stored on the wire
pub const WEBUSB_UUID_BYTES: [u8; 16] = [
    0x38, 0xb6, 0x08, 0x34, 0xa9, 0x09, 0xa0, 0x47, 0x8b, 0xfd, 0xa0, 0x76, 0x88, 0x15, 0xb6, 0x65,
];

/// Endpoint descriptor (7 bytes)
pub fn endpoint_descriptor(address: u8, attributes: u8, max_packet_size: u16) -> Vec<u8> {
    let [lo, hi] = max_packet_size.to_le_bytes();
    vec![7, DT_ENDPOINT, address, attributes, lo, hi, 0]
}

/// Interface descriptor (9 bytes), subclass and protocol 0
pub fn interface_descriptor(
    number: u8,
    alternate: u8,
    num_endpoints: u8,
    class: u8,
    name_index: u8,
) -> Vec<u8> {
    vec![
        9,
        DT_INTERFACE,
        number,
        alternate,
        num_endpoints,
        class,
        0,
        0,
        name_index,
    ]
}

/// Configuration header followed by `body`, wTotalLength filled in
pub fn configuration_descriptor(
    value: u8,
    name_index: u8,
    num_interfaces: u8,
    body: &[Vec<u8>],
) -> Vec<u8> {
    let mut bytes = vec![
        9,
        DT_CONFIGURATION,
        0,
        0,
        num_interfaces,
        value,
        name_index,
        0x80,
        50,
    ];
    for descriptor in body {
        bytes.extend_from_slice(descriptor);
    }
    let total = bytes.len() as u16;
    bytes[2..4].copy_from_slice(&total.to_le_bytes());
    bytes
}

/// Configuration 1 used by [`MockDevice::new`]
///
/// - interface 0, alternate 0: bulk IN 1, bulk OUT 2
/// - interface 0, alternate 1: interrupt IN 3
/// - interface 1, alternate 0: isochronous IN 4
pub fn default_configuration() -> Vec<u8> {
    configuration_descriptor(
        1,
        0,
        2,
        &[
            interface_descriptor(0, 0, 2, 0xff, 0),
            endpoint_descriptor(0x81, 0x02, 64),
            endpoint_descriptor(0x02, 0x02, 64),
            interface_descriptor(0, 1, 1, 0xff, 0),
            endpoint_descriptor(0x83, 0x03, 8),
            interface_descriptor(1, 0, 1, 0x01, 0),
            endpoint_descriptor(0x84, 0x01, 256),
        ],
    )
}

/// BOS header followed by the given capabilities
pub fn bos_descriptor(capabilities: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = vec![5, DT_BOS, 0, 0, capabilities.len() as u8];
    for capability in capabilities {
        bytes.extend_from_slice(capability);
    }
    let total = bytes.len() as u16;
    bytes[2..4].copy_from_slice(&total.to_le_bytes());
    bytes
}

/// WebUSB platform capability (24 bytes, version 1.0)
pub fn webusb_capability(vendor_code: u8, landing_page: u8) -> Vec<u8> {
    let mut bytes = vec![24, DT_DEVICE_CAPABILITY, PLATFORM_CAPABILITY_TYPE, 0];
    bytes.extend_from_slice(&WEBUSB_UUID_BYTES);
    bytes.extend_from_slice(&0x0100u16.to_le_bytes());
    bytes.push(vendor_code);
    bytes.push(landing_page);
    bytes
}

/// URL descriptor as returned by the GET_URL request
pub fn url_descriptor(scheme: u8, url: &str) -> Vec<u8> {
    let mut bytes = vec![(url.len() + 3) as u8, 0x03, scheme];
    bytes.extend_from_slice(url.as_bytes());
    bytes
}

/// Answer to the WebUSB GET_URL request
#[derive(Debug, Clone)]
pub struct UrlResponse {
    pub vendor_code: u8,
    pub landing_page: u8,
    pub bytes: Vec<u8>,
}

/// Scripted device served by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub handle: DeviceHandle,
    pub bcd_usb: u16,
    pub device_class: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub max_packet_size0: u8,
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
    /// Raw configuration blobs, indexed by descriptor index
    pub configurations: Vec<Vec<u8>>,
    pub current_configuration: u8,
    pub bos: Option<Vec<u8>>,
    pub url: Option<UrlResponse>,
    pub strings: HashMap<u8, String>,
    /// Data returned for control IN requests that are not descriptor reads
    pub control_response: Vec<u8>,
    /// Data returned for bulk and interrupt IN transfers
    pub in_data: Vec<u8>,
}

impl MockDevice {
    /// USB 2.0 device with [`default_configuration`], strings 1 and 2
    pub fn new(bus: u8, address: u8) -> Self {
        Self {
            handle: DeviceHandle::new(bus, address),
            bcd_usb: 0x0200,
            device_class: 0,
            vendor_id: 0x1234,
            product_id: 0x5678,
            bcd_device: 0x0100,
            max_packet_size0: 64,
            manufacturer_index: 1,
            product_index: 2,
            serial_number_index: 0,
            configurations: vec![default_configuration()],
            current_configuration: 1,
            bos: None,
            url: None,
            strings: HashMap::from([(1, "Acme".to_string()), (2, "Widget".to_string())]),
            control_response: (0..64).collect(),
            in_data: (0..=255).collect(),
        }
    }

    /// Advertise WebUSB (bcdUSB 2.1) with the given landing page response
    pub fn with_webusb(mut self, vendor_code: u8, landing_page: u8, url: Vec<u8>) -> Self {
        self.bcd_usb = 0x0210;
        self.bos = Some(bos_descriptor(&[webusb_capability(vendor_code, landing_page)]));
        self.url = Some(UrlResponse {
            vendor_code,
            landing_page,
            bytes: url,
        });
        self
    }

    /// Raw 18-byte device descriptor
    pub fn device_descriptor(&self) -> Vec<u8> {
        let mut bytes = vec![18, DT_DEVICE];
        bytes.extend_from_slice(&self.bcd_usb.to_le_bytes());
        bytes.extend_from_slice(&[self.device_class, 0, 0, self.max_packet_size0]);
        bytes.extend_from_slice(&self.vendor_id.to_le_bytes());
        bytes.extend_from_slice(&self.product_id.to_le_bytes());
        bytes.extend_from_slice(&self.bcd_device.to_le_bytes());
        bytes.extend_from_slice(&[
            self.manufacturer_index,
            self.product_index,
            self.serial_number_index,
            self.configurations.len() as u8,
        ]);
        bytes
    }
}

/// Device model equivalent to what discovery builds for [`MockDevice::new`]
pub fn sample_device(handle: DeviceHandle) -> Device {
    let endpoint = |number, direction, endpoint_type, packet_size| Endpoint {
        number,
        direction,
        endpoint_type,
        packet_size,
    };
    let alternate = |setting, class, endpoints| AlternateInterface {
        alternate_setting: setting,
        interface_class: class,
        interface_subclass: 0,
        interface_protocol: 0,
        name: None,
        endpoints,
    };

    Device {
        handle,
        usb_version: UsbVersion::from_bcd(0x0200),
        device_class: 0,
        device_subclass: 0,
        device_protocol: 0,
        vendor_id: 0x1234,
        product_id: 0x5678,
        device_version: UsbVersion::from_bcd(0x0100),
        manufacturer_name: Some("Acme".to_string()),
        product_name: Some("Widget".to_string()),
        serial_number: None,
        url: None,
        max_packet_size0: 64,
        configuration_value: 1,
        configurations: vec![Configuration {
            value: 1,
            name: None,
            interfaces: vec![
                Interface {
                    number: 0,
                    alternates: vec![
                        alternate(
                            0,
                            0xff,
                            vec![
                                endpoint(1, Direction::In, EndpointType::Bulk, 64),
                                endpoint(2, Direction::Out, EndpointType::Bulk, 64),
                            ],
                        ),
                        alternate(
                            1,
                            0xff,
                            vec![endpoint(3, Direction::In, EndpointType::Interrupt, 8)],
                        ),
                    ],
                    claimed: false,
                    alternate_setting: 0,
                },
                Interface {
                    number: 1,
                    alternates: vec![alternate(
                        0,
                        0x01,
                        vec![endpoint(4, Direction::In, EndpointType::Isochronous, 256)],
                    )],
                    claimed: false,
                    alternate_setting: 0,
                },
            ],
        }],
    }
}

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Devices,
    Open(DeviceHandle),
    Close(DeviceHandle),
    ControlIn {
        handle: DeviceHandle,
        request: ControlRequest,
        length: u16,
    },
    ControlOut {
        handle: DeviceHandle,
        request: ControlRequest,
        data: Vec<u8>,
    },
    StringDescriptor {
        handle: DeviceHandle,
        index: u8,
    },
    SetConfiguration {
        handle: DeviceHandle,
        value: u8,
    },
    ClaimInterface {
        handle: DeviceHandle,
        interface: u8,
    },
    ReleaseInterface {
        handle: DeviceHandle,
        interface: u8,
    },
    SetAlternateSetting {
        handle: DeviceHandle,
        interface: u8,
        alternate: u8,
    },
    TransferIn {
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        length: usize,
    },
    TransferOut {
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        data: Vec<u8>,
    },
    Reset(DeviceHandle),
}

/// Call type without arguments, for counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Devices,
    Open,
    Close,
    ControlIn,
    ControlOut,
    StringDescriptor,
    SetConfiguration,
    ClaimInterface,
    ReleaseInterface,
    SetAlternateSetting,
    TransferIn,
    TransferOut,
    Reset,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::Devices => CallKind::Devices,
            Call::Open(_) => CallKind::Open,
            Call::Close(_) => CallKind::Close,
            Call::ControlIn { .. } => CallKind::ControlIn,
            Call::ControlOut { .. } => CallKind::ControlOut,
            Call::StringDescriptor { .. } => CallKind::StringDescriptor,
            Call::SetConfiguration { .. } => CallKind::SetConfiguration,
            Call::ClaimInterface { .. } => CallKind::ClaimInterface,
            Call::ReleaseInterface { .. } => CallKind::ReleaseInterface,
            Call::SetAlternateSetting { .. } => CallKind::SetAlternateSetting,
            Call::TransferIn { .. } => CallKind::TransferIn,
            Call::TransferOut { .. } => CallKind::TransferOut,
            Call::Reset(_) => CallKind::Reset,
        }
    }
}

#[derive(Default)]
struct MockState {
    devices: BTreeMap<DeviceHandle, MockDevice>,
    calls: Vec<Call>,
    next_failures: HashMap<CallKind, TransportError>,
    open_failures: HashMap<DeviceHandle, (u32, TransportError)>,
    vendor_failure: Option<TransportError>,
}

impl MockState {
    /// Record `call`, then apply any injected failure and the presence check
    fn begin(&mut self, call: Call, handle: Option<DeviceHandle>) -> TransportResult<()> {
        let kind = call.kind();
        self.calls.push(call);

        if let Some(error) = self.next_failures.remove(&kind) {
            return Err(error);
        }
        match handle {
            Some(handle) if !self.devices.contains_key(&handle) => Err(TransportError::NoDevice),
            _ => Ok(()),
        }
    }

    fn device(&mut self, handle: DeviceHandle) -> TransportResult<&mut MockDevice> {
        self.devices
            .get_mut(&handle)
            .ok_or(TransportError::NoDevice)
    }
}

/// In-memory [`Transport`] that records every call
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, device: MockDevice) {
        self.lock().devices.insert(device.handle, device);
    }

    pub fn remove_device(&self, handle: DeviceHandle) -> Option<MockDevice> {
        self.lock().devices.remove(&handle)
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail the next call of `kind` with `error`
    pub fn fail_next(&self, kind: CallKind, error: TransportError) {
        self.lock().next_failures.insert(kind, error);
    }

    /// Fail the next `times` opens of `handle`
    pub fn fail_opens(&self, handle: DeviceHandle, times: u32, error: TransportError) {
        self.lock().open_failures.insert(handle, (times, error));
    }

    /// Fail every vendor-type control request from now on
    pub fn fail_vendor_requests(&self, error: TransportError) {
        self.lock().vendor_failure = Some(error);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn truncated(mut bytes: Vec<u8>, length: usize) -> Vec<u8> {
    bytes.truncate(length);
    bytes
}

fn is_vendor(request: &ControlRequest) -> bool {
    request.request_type & 0x60 == RequestType::Vendor.code()
}

#[async_trait]
impl Transport for MockTransport {
    async fn devices(&self) -> TransportResult<Vec<DeviceHandle>> {
        let mut state = self.lock();
        state.begin(Call::Devices, None)?;
        Ok(state.devices.keys().copied().collect())
    }

    async fn open(&self, handle: DeviceHandle) -> TransportResult<()> {
        let mut state = self.lock();
        state.begin(Call::Open(handle), Some(handle))?;

        if let Some((remaining, error)) = state.open_failures.get_mut(&handle)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(error.clone());
        }
        Ok(())
    }

    async fn close(&self, handle: DeviceHandle) -> TransportResult<()> {
        self.lock().begin(Call::Close(handle), Some(handle))
    }

    async fn control_in(
        &self,
        handle: DeviceHandle,
        request: ControlRequest,
        length: u16,
    ) -> TransportResult<Vec<u8>> {
        let mut state = self.lock();
        state.begin(
            Call::ControlIn {
                handle,
                request,
                length,
            },
            Some(handle),
        )?;
        if is_vendor(&request)
            && let Some(error) = state.vendor_failure.clone()
        {
            return Err(error);
        }

        let length = length as usize;
        let device = state.device(handle)?;

        if request.request_type == Direction::IN_BIT && request.request == GET_DESCRIPTOR {
            let index = (request.value & 0xff) as usize;
            let bytes = match (request.value >> 8) as u8 {
                DT_DEVICE => Some(device.device_descriptor()),
                DT_CONFIGURATION => device.configurations.get(index).cloned(),
                DT_BOS => device.bos.clone(),
                _ => None,
            };
            return bytes
                .map(|bytes| truncated(bytes, length))
                .ok_or(TransportError::Pipe);
        }

        if request.request_type == Direction::IN_BIT && request.request == GET_CONFIGURATION {
            return Ok(vec![device.current_configuration]);
        }

        if let Some(url) = &device.url
            && request.request_type == URL_REQUEST_TYPE
            && request.request == url.vendor_code
            && request.value == url.landing_page as u16
            && request.index == URL_REQUEST_INDEX
        {
            return Ok(truncated(url.bytes.clone(), length));
        }

        Ok(truncated(device.control_response.clone(), length))
    }

    async fn control_out(
        &self,
        handle: DeviceHandle,
        request: ControlRequest,
        data: &[u8],
    ) -> TransportResult<usize> {
        let mut state = self.lock();
        state.begin(
            Call::ControlOut {
                handle,
                request,
                data: data.to_vec(),
            },
            Some(handle),
        )?;
        if is_vendor(&request)
            && let Some(error) = state.vendor_failure.clone()
        {
            return Err(error);
        }
        Ok(data.len())
    }

    async fn string_descriptor(&self, handle: DeviceHandle, index: u8) -> TransportResult<String> {
        let mut state = self.lock();
        state.begin(Call::StringDescriptor { handle, index }, Some(handle))?;
        state
            .device(handle)?
            .strings
            .get(&index)
            .cloned()
            .ok_or(TransportError::Pipe)
    }

    async fn set_configuration(&self, handle: DeviceHandle, value: u8) -> TransportResult<()> {
        let mut state = self.lock();
        state.begin(Call::SetConfiguration { handle, value }, Some(handle))?;
        state.device(handle)?.current_configuration = value;
        Ok(())
    }

    async fn claim_interface(&self, handle: DeviceHandle, interface: u8) -> TransportResult<()> {
        self.lock()
            .begin(Call::ClaimInterface { handle, interface }, Some(handle))
    }

    async fn release_interface(&self, handle: DeviceHandle, interface: u8) -> TransportResult<()> {
        self.lock()
            .begin(Call::ReleaseInterface { handle, interface }, Some(handle))
    }

    async fn set_alternate_setting(
        &self,
        handle: DeviceHandle,
        interface: u8,
        alternate: u8,
    ) -> TransportResult<()> {
        self.lock().begin(
            Call::SetAlternateSetting {
                handle,
                interface,
                alternate,
            },
            Some(handle),
        )
    }

    async fn transfer_in(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        length: usize,
    ) -> TransportResult<Vec<u8>> {
        let mut state = self.lock();
        state.begin(
            Call::TransferIn {
                handle,
                endpoint,
                kind,
                length,
            },
            Some(handle),
        )?;
        Ok(truncated(state.device(handle)?.in_data.clone(), length))
    }

    async fn transfer_out(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        data: &[u8],
    ) -> TransportResult<usize> {
        self.lock().begin(
            Call::TransferOut {
                handle,
                endpoint,
                kind,
                data: data.to_vec(),
            },
            Some(handle),
        )?;
        Ok(data.len())
    }

    async fn reset(&self, handle: DeviceHandle) -> TransportResult<()> {
        self.lock().begin(Call::Reset(handle), Some(handle))
    }
}

/// Session over a [`MockTransport`] with `devices` already discovered
///
/// Discovery uses a single open attempt and the call log is cleared
/// before returning.
pub async fn live_session(devices: Vec<MockDevice>) -> (Arc<MockTransport>, Arc<Session>) {
    let transport = Arc::new(MockTransport::new());
    for device in devices {
        transport.add_device(device);
    }

    let options = SessionOptions {
        retry: RetryPolicy::none(),
        ..SessionOptions::default()
    };
    let session = Arc::new(Session::with_options(transport.clone(), options));
    if let Err(e) = session.list_devices().await {
        panic!("mock enumeration failed: {}", e);
    }
    transport.clear_calls();

    (transport, session)
}
