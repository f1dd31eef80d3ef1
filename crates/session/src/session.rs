//! Session state machine
//!
//! [`Session`] owns the live device registry and gates every operation on
//! a device: connectivity first, then the state each operation needs
//! (open, configured, claimed), then the transport call, then the state
//! update.

use crate::discovery::discover;
use crate::error::{Missing, Operation, Result, SessionError};
use crate::model::{Device, Interface};
use crate::registry::{Lease, Registry};
use crate::transport::{Transport, TransportEvent};
use async_channel::Receiver;
use common::{DEFAULT_QUEUE_CAPACITY, EventBus, RetryPolicy, Subscription};
use protocol::DeviceHandle;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tunables for a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Retry policy for the open performed during discovery
    pub retry: RetryPolicy,
    /// Per-subscriber event queue depth
    pub queue_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Device lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A newly attached device finished discovery
    Connected(Device),
    /// A live device was detached
    Disconnected(DeviceHandle),
}

/// USB session over a [`Transport`]
pub struct Session {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Registry,
    events: EventBus<DeviceEvent>,
    /// Serializes discovery across devices
    discovery: Mutex<()>,
    options: SessionOptions,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, SessionOptions::default())
    }

    pub fn with_options(transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        Self {
            transport,
            registry: Registry::default(),
            events: EventBus::new(options.queue_capacity),
            discovery: Mutex::new(()),
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Subscribe to connect/disconnect events
    pub fn subscribe(&self) -> Subscription<DeviceEvent> {
        self.events.subscribe()
    }

    /// Enumerate through the transport and return every live device
    ///
    /// Devices that are already live are not rediscovered, so an open
    /// session on them is left alone. Devices whose discovery fails are
    /// skipped.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let _discovery = self.discovery.lock().await;

        let handles = self
            .transport
            .devices()
            .await
            .map_err(SessionError::transport(Operation::ListDevices))?;

        for handle in handles {
            if self.registry.contains(handle).await {
                continue;
            }

            match discover(self.transport.as_ref(), handle, self.options.retry).await {
                Ok(device) => {
                    debug!("Discovered device {}", handle);
                    self.registry.insert(device).await;
                }
                Err(e) => debug!("Skipping device {}: {}", handle, e),
            }
        }

        Ok(self.registry.devices().await)
    }

    /// Snapshots of live devices, no I/O
    pub async fn devices(&self) -> Vec<Device> {
        self.registry.devices().await
    }

    pub async fn device(&self, handle: DeviceHandle) -> Option<Device> {
        self.registry.device(handle).await
    }

    pub async fn is_connected(&self, handle: DeviceHandle) -> bool {
        self.registry.contains(handle).await
    }

    pub async fn is_opened(&self, handle: DeviceHandle) -> bool {
        self.registry.is_opened(handle).await.unwrap_or(false)
    }

    /// Apply a hot-plug notification
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Attached(handle) => self.attach(handle).await,
            TransportEvent::Detached(handle) => self.detach(handle).await,
        }
    }

    /// Consume transport events on a background task until the channel closes
    pub fn spawn_event_loop(self: &Arc<Self>, events: Receiver<TransportEvent>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                session.handle_event(event).await;
            }
            debug!("Transport event channel closed");
        })
    }

    async fn attach(&self, handle: DeviceHandle) {
        let _discovery = self.discovery.lock().await;

        if self.registry.contains(handle).await {
            debug!("Device {} already live, ignoring attach", handle);
            return;
        }

        match discover(self.transport.as_ref(), handle, self.options.retry).await {
            Ok(device) => {
                if self.registry.insert(device.clone()).await {
                    info!(
                        "Device connected: {} ({:04x}:{:04x})",
                        handle, device.vendor_id, device.product_id
                    );
                    self.events.publish(DeviceEvent::Connected(device));
                }
            }
            Err(e) => warn!("Discovery of attached device {} failed: {}", handle, e),
        }
    }

    async fn detach(&self, handle: DeviceHandle) {
        // Ordered after any discovery in flight for the same handle
        let _discovery = self.discovery.lock().await;

        let Some(state) = self.registry.remove(handle).await else {
            debug!("Detach for unknown device {}", handle);
            return;
        };

        if state.opened
            && let Err(e) = self.transport.close(handle).await
        {
            debug!("Close of detached device {} failed: {}", handle, e);
        }

        info!("Device disconnected: {}", handle);
        self.events.publish(DeviceEvent::Disconnected(handle));
    }

    pub async fn open(&self, handle: DeviceHandle) -> Result<()> {
        let op = Operation::Open;
        let lease = self.lease(handle, op).await?;
        if lease.state.opened {
            return Ok(());
        }

        self.transport
            .open(handle)
            .await
            .map_err(SessionError::transport(op))?;
        self.registry
            .update(handle, |state| state.opened = true)
            .await;

        debug!("Opened device {}", handle);
        Ok(())
    }

    /// Close the device, dropping every claim
    pub async fn close(&self, handle: DeviceHandle) -> Result<()> {
        let op = Operation::Close;
        let lease = self.lease(handle, op).await?;
        if !lease.state.opened {
            return Ok(());
        }

        self.transport
            .close(handle)
            .await
            .map_err(SessionError::transport(op))?;
        self.registry
            .update(handle, |state| {
                state.opened = false;
                state.device.reset_interfaces();
            })
            .await;

        debug!("Closed device {}", handle);
        Ok(())
    }

    pub async fn select_configuration(&self, handle: DeviceHandle, value: u8) -> Result<()> {
        let op = Operation::SelectConfiguration;
        let lease = self.lease(handle, op).await?;
        let device = &lease.state.device;

        if device.configuration_value == value {
            return Ok(());
        }
        if device.find_configuration(value).is_none() {
            return Err(SessionError::not_found(op, Missing::Configuration));
        }
        ensure_opened(&lease, op)?;

        self.transport
            .set_configuration(handle, value)
            .await
            .map_err(SessionError::transport(op))?;
        self.registry
            .update(handle, |state| {
                state.device.configuration_value = value;
                state.device.reset_interfaces();
            })
            .await;

        debug!("Device {} now in configuration {}", handle, value);
        Ok(())
    }

    pub async fn claim_interface(&self, handle: DeviceHandle, interface: u8) -> Result<()> {
        let op = Operation::ClaimInterface;
        let lease = self.lease(handle, op).await?;
        let claimed = find_interface(&lease.state.device, interface, op)?.claimed;
        ensure_opened(&lease, op)?;
        if claimed {
            return Ok(());
        }

        self.transport
            .claim_interface(handle, interface)
            .await
            .map_err(SessionError::transport(op))?;
        self.set_claimed(handle, interface, true).await;

        debug!("Claimed interface {} on {}", interface, handle);
        Ok(())
    }

    pub async fn release_interface(&self, handle: DeviceHandle, interface: u8) -> Result<()> {
        let op = Operation::ReleaseInterface;
        let lease = self.lease(handle, op).await?;
        let claimed = find_interface(&lease.state.device, interface, op)?.claimed;
        ensure_opened(&lease, op)?;
        if !claimed {
            return Ok(());
        }

        self.transport
            .release_interface(handle, interface)
            .await
            .map_err(SessionError::transport(op))?;
        self.set_claimed(handle, interface, false).await;

        debug!("Released interface {} on {}", interface, handle);
        Ok(())
    }

    pub async fn select_alternate_interface(
        &self,
        handle: DeviceHandle,
        interface: u8,
        alternate: u8,
    ) -> Result<()> {
        let op = Operation::SelectAlternateInterface;
        let lease = self.lease(handle, op).await?;
        let current = find_interface(&lease.state.device, interface, op)?;
        ensure_opened(&lease, op)?;
        ensure_claimed(current, op)?;
        if current.find_alternate(alternate).is_none() {
            return Err(SessionError::not_found(op, Missing::Alternate));
        }

        self.transport
            .set_alternate_setting(handle, interface, alternate)
            .await
            .map_err(SessionError::transport(op))?;
        self.registry
            .update(handle, |state| {
                if let Some(current) = state
                    .device
                    .configuration_mut()
                    .and_then(|c| c.interface_mut(interface))
                {
                    current.alternate_setting = alternate;
                }
            })
            .await;

        debug!(
            "Interface {} on {} switched to alternate {}",
            interface, handle, alternate
        );
        Ok(())
    }

    pub async fn reset(&self, handle: DeviceHandle) -> Result<()> {
        let op = Operation::Reset;
        let lease = self.lease(handle, op).await?;
        ensure_opened(&lease, op)?;

        self.transport
            .reset(handle)
            .await
            .map_err(SessionError::transport(op))?;

        debug!("Reset device {}", handle);
        Ok(())
    }

    /// Connectivity check shared by every operation
    pub(crate) async fn lease(&self, handle: DeviceHandle, op: Operation) -> Result<Lease> {
        self.registry
            .lease(handle)
            .await
            .ok_or(SessionError::not_found(op, Missing::Device))
    }

    async fn set_claimed(&self, handle: DeviceHandle, interface: u8, claimed: bool) {
        self.registry
            .update(handle, |state| {
                if let Some(current) = state
                    .device
                    .configuration_mut()
                    .and_then(|c| c.interface_mut(interface))
                {
                    current.claimed = claimed;
                }
            })
            .await;
    }
}

pub(crate) fn ensure_opened(lease: &Lease, op: Operation) -> Result<()> {
    if lease.state.opened {
        Ok(())
    } else {
        Err(SessionError::invalid_state(op, "device not open"))
    }
}

pub(crate) fn ensure_claimed(interface: &Interface, op: Operation) -> Result<()> {
    if interface.claimed {
        Ok(())
    } else {
        Err(SessionError::invalid_state(op, "interface not claimed"))
    }
}

/// Interface `number` of the active configuration
pub(crate) fn find_interface(device: &Device, number: u8, op: Operation) -> Result<&Interface> {
    device
        .configuration()
        .ok_or(SessionError::invalid_state(op, "device not configured"))?
        .interface(number)
        .ok_or(SessionError::not_found(op, Missing::Interface))
}
