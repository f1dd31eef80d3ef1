//! Device model builder
//!
//! Turns parsed descriptors into the [`Device`] model, resolving string
//! descriptors through the transport one at a time.

use crate::error::{DiscoveryError, TransportError};
use crate::model::{AlternateInterface, Configuration, Device, Endpoint, Interface};
use crate::transport::Transport;
use protocol::{
    ConfigurationDescriptor, DeviceDescriptor, DeviceHandle, EndpointDescriptor,
    InterfaceDescriptor, UsbVersion,
};
use std::collections::HashSet;
use tracing::debug;

/// Everything discovery read from a device, before strings are resolved
#[derive(Debug, Clone)]
pub struct RawDevice {
    pub handle: DeviceHandle,
    pub descriptor: DeviceDescriptor,
    pub configurations: Vec<ConfigurationDescriptor>,
    /// Answer to GET_CONFIGURATION
    pub configuration_value: u8,
    pub url: Option<String>,
}

/// Map a raw endpoint descriptor onto the model
pub fn build_endpoint(descriptor: &EndpointDescriptor) -> Endpoint {
    Endpoint {
        number: descriptor.number(),
        direction: descriptor.direction(),
        endpoint_type: descriptor.endpoint_type(),
        packet_size: descriptor.max_packet_size,
    }
}

pub(crate) struct DeviceBuilder<'a> {
    transport: &'a dyn Transport,
    handle: DeviceHandle,
}

impl<'a> DeviceBuilder<'a> {
    pub(crate) fn new(transport: &'a dyn Transport, handle: DeviceHandle) -> Self {
        Self { transport, handle }
    }

    pub(crate) async fn build(&self, raw: &RawDevice) -> Result<Device, DiscoveryError> {
        if raw.configurations.is_empty() {
            return Err(DiscoveryError::NoConfigurations);
        }

        let descriptor = &raw.descriptor;
        let manufacturer_name = self.string(descriptor.manufacturer_index).await?;
        let product_name = self.string(descriptor.product_index).await?;
        let serial_number = self.string(descriptor.serial_number_index).await?;

        let mut configurations = Vec::with_capacity(raw.configurations.len());
        for configuration in &raw.configurations {
            configurations.push(self.configuration(configuration).await?);
        }

        Ok(Device {
            handle: raw.handle,
            usb_version: UsbVersion::from_bcd(descriptor.bcd_usb),
            device_class: descriptor.device_class,
            device_subclass: descriptor.device_subclass,
            device_protocol: descriptor.device_protocol,
            vendor_id: descriptor.vendor_id,
            product_id: descriptor.product_id,
            device_version: UsbVersion::from_bcd(descriptor.bcd_device),
            manufacturer_name,
            product_name,
            serial_number,
            url: raw.url.clone(),
            max_packet_size0: descriptor.max_packet_size0,
            configuration_value: raw.configuration_value,
            configurations,
        })
    }

    async fn configuration(
        &self,
        descriptor: &ConfigurationDescriptor,
    ) -> Result<Configuration, DiscoveryError> {
        let name = self.string(descriptor.configuration_index).await?;
        let interfaces = self.interfaces(&descriptor.interfaces).await?;

        Ok(Configuration {
            value: descriptor.configuration_value,
            name,
            interfaces,
        })
    }

    /// Group alternates by interface number, in order of first appearance
    async fn interfaces(
        &self,
        descriptors: &[InterfaceDescriptor],
    ) -> Result<Vec<Interface>, DiscoveryError> {
        let mut interfaces: Vec<Interface> = Vec::new();

        for descriptor in descriptors {
            let alternate = self.alternate(descriptor).await?;
            match interfaces
                .iter_mut()
                .find(|i| i.number == descriptor.interface_number)
            {
                Some(interface) => interface.alternates.push(alternate),
                None => interfaces.push(Interface {
                    number: descriptor.interface_number,
                    alternates: vec![alternate],
                    claimed: false,
                    alternate_setting: 0,
                }),
            }
        }

        Ok(interfaces)
    }

    async fn alternate(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<AlternateInterface, DiscoveryError> {
        let name = self.string(descriptor.interface_index).await?;

        let mut seen = HashSet::new();
        let mut endpoints = Vec::with_capacity(descriptor.endpoints.len());
        for raw in &descriptor.endpoints {
            let endpoint = build_endpoint(raw);
            if !seen.insert((endpoint.number, endpoint.direction)) {
                return Err(DiscoveryError::DuplicateEndpoint {
                    interface: descriptor.interface_number,
                    alternate: descriptor.alternate_setting,
                    address: endpoint.address(),
                });
            }
            endpoints.push(endpoint);
        }

        Ok(AlternateInterface {
            alternate_setting: descriptor.alternate_setting,
            interface_class: descriptor.interface_class,
            interface_subclass: descriptor.interface_subclass,
            interface_protocol: descriptor.interface_protocol,
            name,
            endpoints,
        })
    }

    /// Index 0 means the device has no such string
    async fn string(&self, index: u8) -> Result<Option<String>, TransportError> {
        if index == 0 {
            return Ok(None);
        }

        let value = self
            .transport
            .string_descriptor(self.handle, index)
            .await
            .inspect_err(|e| debug!("String {} of {} unreadable: {}", index, self.handle, e))?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        MockDevice, MockTransport, configuration_descriptor, endpoint_descriptor,
        interface_descriptor,
    };
    use protocol::{Direction, EndpointType};

    fn raw_device(mock: &MockDevice, configurations: Vec<Vec<u8>>) -> RawDevice {
        RawDevice {
            handle: mock.handle,
            descriptor: DeviceDescriptor::parse(&mock.device_descriptor()).unwrap(),
            configurations: configurations
                .iter()
                .map(|bytes| ConfigurationDescriptor::parse(bytes).unwrap())
                .collect(),
            configuration_value: 1,
            url: None,
        }
    }

    #[test]
    fn test_build_endpoint() {
        let raw = EndpointDescriptor {
            address: 0x83,
            attributes: 0x03,
            max_packet_size: 16,
            interval: 1,
        };
        let endpoint = build_endpoint(&raw);
        assert_eq!(endpoint.number, 3);
        assert_eq!(endpoint.direction, Direction::In);
        assert_eq!(endpoint.endpoint_type, EndpointType::Interrupt);
        assert_eq!(endpoint.packet_size, 16);

        // Control endpoints fall through to isochronous
        let raw = EndpointDescriptor {
            attributes: 0x00,
            address: 0x04,
            ..raw
        };
        let endpoint = build_endpoint(&raw);
        assert_eq!(endpoint.direction, Direction::Out);
        assert_eq!(endpoint.endpoint_type, EndpointType::Isochronous);
    }

    #[tokio::test]
    async fn test_groups_alternates_by_interface() {
        let mock = MockDevice::new(1, 2);
        let transport = MockTransport::new();
        transport.add_device(mock.clone());

        let config = configuration_descriptor(
            1,
            0,
            2,
            &[
                interface_descriptor(0, 0, 1, 0xff, 0),
                endpoint_descriptor(0x81, 0x02, 64),
                interface_descriptor(1, 0, 0, 0xff, 0),
                interface_descriptor(0, 1, 1, 0xff, 0),
                endpoint_descriptor(0x82, 0x03, 8),
            ],
        );

        let device = DeviceBuilder::new(&transport, mock.handle)
            .build(&raw_device(&mock, vec![config]))
            .await
            .unwrap();

        let config = &device.configurations[0];
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(config.interfaces[0].number, 0);
        assert_eq!(config.interfaces[0].alternates.len(), 2);
        assert_eq!(config.interfaces[0].alternates[1].alternate_setting, 1);
        assert_eq!(config.interfaces[1].number, 1);
        assert_eq!(device.manufacturer_name.as_deref(), Some("Acme"));
        assert!(device.serial_number.is_none());
    }

    #[tokio::test]
    async fn test_string_index_zero_skips_transport() {
        let mut mock = MockDevice::new(1, 2);
        mock.manufacturer_index = 0;
        mock.product_index = 0;
        let transport = MockTransport::new();
        transport.add_device(mock.clone());

        let config = configuration_descriptor(1, 0, 0, &[]);
        let device = DeviceBuilder::new(&transport, mock.handle)
            .build(&raw_device(&mock, vec![config]))
            .await
            .unwrap();

        assert!(device.manufacturer_name.is_none());
        assert!(device.product_name.is_none());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_string_failure_fails_build() {
        let mut mock = MockDevice::new(1, 2);
        mock.strings.clear();
        let transport = MockTransport::new();
        transport.add_device(mock.clone());

        let config = configuration_descriptor(1, 0, 0, &[]);
        let result = DeviceBuilder::new(&transport, mock.handle)
            .build(&raw_device(&mock, vec![config]))
            .await;
        assert!(matches!(result, Err(DiscoveryError::Transport(_))));
    }

    #[tokio::test]
    async fn test_rejects_duplicate_endpoints() {
        let mock = MockDevice::new(1, 2);
        let transport = MockTransport::new();
        transport.add_device(mock.clone());

        let config = configuration_descriptor(
            1,
            0,
            1,
            &[
                interface_descriptor(0, 0, 2, 0xff, 0),
                endpoint_descriptor(0x81, 0x02, 64),
                endpoint_descriptor(0x81, 0x03, 8),
            ],
        );
        let result = DeviceBuilder::new(&transport, mock.handle)
            .build(&raw_device(&mock, vec![config]))
            .await;
        assert_eq!(
            result.unwrap_err(),
            DiscoveryError::DuplicateEndpoint {
                interface: 0,
                alternate: 0,
                address: 0x81
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_no_configurations() {
        let mock = MockDevice::new(1, 2);
        let transport = MockTransport::new();
        let result = DeviceBuilder::new(&transport, mock.handle)
            .build(&raw_device(&mock, vec![]))
            .await;
        assert_eq!(result.unwrap_err(), DiscoveryError::NoConfigurations);
    }
}
