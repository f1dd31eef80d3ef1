//! Device model
//!
//! Snapshot of a device's identity and descriptor tree, plus the mutable
//! bits the session tracks (current configuration, claims, alternates).
//! Values handed out by the session are clones; mutating them has no
//! effect on the live state.

use protocol::{DeviceHandle, Direction, EndpointType, UsbVersion, endpoint_address};
use serde::Serialize;

/// A discovered USB device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub handle: DeviceHandle,
    pub usb_version: UsbVersion,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: UsbVersion,
    pub manufacturer_name: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    /// WebUSB landing page
    pub url: Option<String>,
    /// Maximum packet size of endpoint 0
    pub max_packet_size0: u8,
    /// Value of the active configuration, 0 when unconfigured
    pub configuration_value: u8,
    pub configurations: Vec<Configuration>,
}

impl Device {
    /// The active configuration, if any matches the current value
    pub fn configuration(&self) -> Option<&Configuration> {
        self.find_configuration(self.configuration_value)
    }

    pub fn configuration_mut(&mut self) -> Option<&mut Configuration> {
        let value = self.configuration_value;
        self.configurations.iter_mut().find(|c| c.value == value)
    }

    pub fn find_configuration(&self, value: u8) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.value == value)
    }

    /// Drop every claim and go back to alternate 0 everywhere
    pub(crate) fn reset_interfaces(&mut self) {
        for configuration in &mut self.configurations {
            for interface in &mut configuration.interfaces {
                interface.claimed = false;
                interface.alternate_setting = 0;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub value: u8,
    pub name: Option<String>,
    pub interfaces: Vec<Interface>,
}

impl Configuration {
    pub fn interface(&self, number: u8) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.number == number)
    }

    pub fn interface_mut(&mut self, number: u8) -> Option<&mut Interface> {
        self.interfaces.iter_mut().find(|i| i.number == number)
    }

    /// Find an endpoint among the current alternates of every interface
    ///
    /// Returns the owning interface together with the endpoint.
    pub fn find_endpoint(&self, number: u8, direction: Direction) -> Option<(&Interface, &Endpoint)> {
        self.interfaces.iter().find_map(|interface| {
            interface
                .alternate()
                .and_then(|alternate| alternate.endpoint(number, direction))
                .map(|endpoint| (interface, endpoint))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub number: u8,
    pub alternates: Vec<AlternateInterface>,
    pub claimed: bool,
    /// Currently selected alternate setting
    pub alternate_setting: u8,
}

impl Interface {
    /// The currently selected alternate
    pub fn alternate(&self) -> Option<&AlternateInterface> {
        self.find_alternate(self.alternate_setting)
    }

    pub fn find_alternate(&self, setting: u8) -> Option<&AlternateInterface> {
        self.alternates
            .iter()
            .find(|a| a.alternate_setting == setting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternateInterface {
    pub alternate_setting: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub name: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

impl AlternateInterface {
    pub fn endpoint(&self, number: u8, direction: Direction) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.number == number && e.direction == direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub number: u8,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    pub packet_size: u16,
}

impl Endpoint {
    /// Full endpoint address (number plus direction bit)
    pub fn address(&self) -> u8 {
        endpoint_address(self.number, self.direction)
    }
}
