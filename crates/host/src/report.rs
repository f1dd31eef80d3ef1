//! Human-readable device and event output for the CLI

use session::{Device, DeviceEvent};
use std::fmt::Write;

/// Multi-line summary of a device, as printed by `--list-devices`
pub fn describe_device(device: &Device) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  [{}] {:04x}:{:04x} - {} {}",
        device.handle,
        device.vendor_id,
        device.product_id,
        device
            .manufacturer_name
            .as_deref()
            .unwrap_or("Unknown Manufacturer"),
        device.product_name.as_deref().unwrap_or("Unknown Product")
    );
    let _ = writeln!(
        out,
        "      USB {} Device {} Configuration {}",
        device.usb_version, device.device_version, device.configuration_value
    );
    if let Some(serial) = &device.serial_number {
        let _ = writeln!(out, "      Serial: {}", serial);
    }
    if let Some(url) = &device.url {
        let _ = writeln!(out, "      Landing page: {}", url);
    }

    for configuration in &device.configurations {
        let _ = writeln!(
            out,
            "      Configuration {}: {} interface(s)",
            configuration.value,
            configuration.interfaces.len()
        );
    }

    out
}

/// One-line rendering of a device event, as printed by `--watch`
pub fn describe_event(event: &DeviceEvent) -> String {
    match event {
        DeviceEvent::Connected(device) => format!(
            "+ {} {:04x}:{:04x} {}",
            device.handle,
            device.vendor_id,
            device.product_id,
            device.url.as_deref().unwrap_or("-")
        ),
        DeviceEvent::Disconnected(handle) => format!("- {}", handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DeviceHandle;
    use session::test_utils::sample_device;

    #[test]
    fn test_describe_device() {
        let mut device = sample_device(DeviceHandle::new(1, 4));
        device.url = Some("https://ex.org".to_string());

        let text = describe_device(&device);
        assert!(text.contains("[1.4] 1234:5678 - Acme Widget"));
        assert!(text.contains("USB 2.0.0"));
        assert!(text.contains("Landing page: https://ex.org"));
        assert!(!text.contains("Serial"));
    }

    #[test]
    fn test_describe_event() {
        let handle = DeviceHandle::new(1, 4);
        let connected = DeviceEvent::Connected(sample_device(handle));
        assert_eq!(describe_event(&connected), "+ 1.4 1234:5678 -");
        assert_eq!(describe_event(&DeviceEvent::Disconnected(handle)), "- 1.4");
    }
}
