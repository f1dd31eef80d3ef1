//! Per-device discovery pipeline
//!
//! Opens the device (retrying while the OS still holds it), reads the
//! device and configuration descriptors, the active configuration, the
//! BOS and WebUSB landing page when the device is new enough, resolves
//! strings and closes the device again. Every step waits for the previous
//! one.

use crate::builder::{DeviceBuilder, RawDevice};
use crate::error::DiscoveryError;
use crate::model::Device;
use crate::transport::Transport;
use common::{RetryPolicy, retry};
use protocol::bos::{BOS_HEADER_SIZE, BOS_MIN_USB_VERSION};
use protocol::descriptor::{
    CONFIGURATION_HEADER_SIZE, DEVICE_DESCRIPTOR_SIZE, DT_BOS, DT_CONFIGURATION, DT_DEVICE,
};
use protocol::webusb::URL_RESPONSE_LENGTH;
use protocol::{
    BosDescriptor, ConfigurationDescriptor, ControlRequest, DeviceDescriptor, DeviceHandle,
    decode_url, find_web_capability,
};
use tracing::{debug, warn};

/// Discover one device and build its model
///
/// The device is left closed whether or not discovery succeeds.
pub(crate) async fn discover(
    transport: &dyn Transport,
    handle: DeviceHandle,
    policy: RetryPolicy,
) -> Result<Device, DiscoveryError> {
    retry(policy, || transport.open(handle)).await?;

    let result = read_device(transport, handle).await;

    if let Err(e) = transport.close(handle).await {
        debug!("Closing {} after discovery failed: {}", handle, e);
    }

    result
}

async fn read_device(
    transport: &dyn Transport,
    handle: DeviceHandle,
) -> Result<Device, DiscoveryError> {
    let bytes = transport
        .control_in(
            handle,
            ControlRequest::get_descriptor(DT_DEVICE, 0),
            DEVICE_DESCRIPTOR_SIZE as u16,
        )
        .await?;
    let descriptor = DeviceDescriptor::parse(&bytes)?;

    let mut configurations = Vec::with_capacity(descriptor.num_configurations as usize);
    for index in 0..descriptor.num_configurations {
        configurations.push(read_configuration(transport, handle, index).await?);
    }

    let current = transport
        .control_in(handle, ControlRequest::get_configuration(), 1)
        .await?;
    let configuration_value = current.first().copied().unwrap_or(0);

    let url = if descriptor.bcd_usb >= BOS_MIN_USB_VERSION {
        read_landing_page(transport, handle).await
    } else {
        None
    };

    let raw = RawDevice {
        handle,
        descriptor,
        configurations,
        configuration_value,
        url,
    };

    DeviceBuilder::new(transport, handle).build(&raw).await
}

/// Read the 9-byte header first to learn wTotalLength, then the whole blob
async fn read_configuration(
    transport: &dyn Transport,
    handle: DeviceHandle,
    index: u8,
) -> Result<ConfigurationDescriptor, DiscoveryError> {
    let request = ControlRequest::get_descriptor(DT_CONFIGURATION, index);

    let header = transport
        .control_in(handle, request, CONFIGURATION_HEADER_SIZE as u16)
        .await?;
    let total_length = ConfigurationDescriptor::total_length_of(&header)?;

    let bytes = transport.control_in(handle, request, total_length).await?;
    Ok(ConfigurationDescriptor::parse(&bytes)?)
}

async fn read_bos(
    transport: &dyn Transport,
    handle: DeviceHandle,
) -> Result<BosDescriptor, DiscoveryError> {
    let request = ControlRequest::get_descriptor(DT_BOS, 0);

    let header = transport
        .control_in(handle, request, BOS_HEADER_SIZE as u16)
        .await?;
    let total_length = BosDescriptor::total_length_of(&header)?;

    let bytes = transport.control_in(handle, request, total_length).await?;
    Ok(BosDescriptor::parse(&bytes)?)
}

/// Landing page URL, `None` on any failure along the way
async fn read_landing_page(transport: &dyn Transport, handle: DeviceHandle) -> Option<String> {
    let bos = match read_bos(transport, handle).await {
        Ok(bos) => bos,
        Err(e) => {
            debug!("No usable BOS on {}: {}", handle, e);
            return None;
        }
    };

    let capability = find_web_capability(&bos.capabilities)?;
    let request = capability.url_request()?;

    match transport
        .control_in(handle, request, URL_RESPONSE_LENGTH)
        .await
    {
        Ok(bytes) => decode_url(&bytes),
        Err(e) => {
            warn!("Failed to read WebUSB landing page of {}: {}", handle, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::test_utils::{Call, CallKind, MockDevice, MockTransport, url_descriptor};
    use std::time::Duration;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_discovers_default_device() {
        let mock = MockDevice::new(1, 4);
        let transport = MockTransport::new();
        transport.add_device(mock.clone());

        let device = discover(&transport, mock.handle, quick_retry()).await.unwrap();
        assert_eq!(device.vendor_id, mock.vendor_id);
        assert_eq!(device.usb_version.to_string(), "2.0.0");
        assert_eq!(device.configuration_value, 1);
        assert_eq!(device.configurations.len(), 1);
        assert!(device.url.is_none());

        // Below USB 2.0.1 the BOS is never requested
        assert!(!transport.calls().iter().any(|call| matches!(
            call,
            Call::ControlIn { request, .. } if request.value >> 8 == DT_BOS as u16
        )));
        assert_eq!(transport.calls().last(), Some(&Call::Close(mock.handle)));
    }

    #[tokio::test]
    async fn test_reads_landing_page() {
        let mock = MockDevice::new(1, 4).with_webusb(0x22, 1, url_descriptor(1, "ex.org"));
        let transport = MockTransport::new();
        transport.add_device(mock.clone());

        let device = discover(&transport, mock.handle, quick_retry()).await.unwrap();
        assert_eq!(device.url.as_deref(), Some("https://ex.org"));
    }

    #[tokio::test]
    async fn test_url_failure_keeps_device() {
        let mock = MockDevice::new(1, 4).with_webusb(0x22, 1, url_descriptor(1, "ex.org"));
        let transport = MockTransport::new();
        transport.add_device(mock.clone());
        transport.fail_vendor_requests(TransportError::Pipe);

        let device = discover(&transport, mock.handle, quick_retry()).await.unwrap();
        assert!(device.url.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_retries_then_succeeds() {
        let mock = MockDevice::new(1, 4);
        let transport = MockTransport::new();
        transport.add_device(mock.clone());
        transport.fail_opens(mock.handle, 2, TransportError::Busy);

        assert!(discover(&transport, mock.handle, quick_retry()).await.is_ok());
        assert_eq!(transport.count(CallKind::Open), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_exhaustion_discards_device() {
        let mock = MockDevice::new(1, 4);
        let transport = MockTransport::new();
        transport.add_device(mock.clone());
        transport.fail_opens(mock.handle, 5, TransportError::Access);

        let result = discover(&transport, mock.handle, quick_retry()).await;
        assert_eq!(
            result.unwrap_err(),
            DiscoveryError::Transport(TransportError::Access)
        );
        assert_eq!(transport.count(CallKind::Open), 3);
        assert_eq!(transport.count(CallKind::ControlIn), 0);
    }

    #[tokio::test]
    async fn test_descriptor_failure_still_closes() {
        let mock = MockDevice::new(1, 4);
        let transport = MockTransport::new();
        transport.add_device(mock.clone());
        transport.fail_next(CallKind::ControlIn, TransportError::Io);

        let result = discover(&transport, mock.handle, quick_retry()).await;
        assert!(result.is_err());
        assert_eq!(transport.count(CallKind::Close), 1);
    }
}
