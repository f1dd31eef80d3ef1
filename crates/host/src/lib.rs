//! Native host for WebUSB sessions
//!
//! [`RusbTransport`](transport::RusbTransport) implements the session
//! transport on top of libusb, [`HotplugWatcher`](hotplug::HotplugWatcher)
//! feeds attach/detach notifications into a session, and
//! [`HostConfig`](config::HostConfig) carries the TOML configuration of the
//! `webusb-host` binary.

pub mod config;
pub mod hotplug;
pub mod report;
pub mod transport;

pub use config::{HostConfig, load_config};
pub use hotplug::HotplugWatcher;
pub use transport::{RusbTransport, map_rusb_error};
