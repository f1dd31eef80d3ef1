//! Transport contract
//!
//! A [`Transport`] is the platform's USB access layer: it enumerates
//! devices, performs the raw I/O and reports attach/detach. The session
//! layer never talks to the OS directly.

use crate::error::TransportError;
use async_trait::async_trait;
use protocol::{ControlRequest, DeviceHandle, EndpointType};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Hot-plug notification from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Attached(DeviceHandle),
    Detached(DeviceHandle),
}

impl TransportEvent {
    pub fn handle(&self) -> DeviceHandle {
        match self {
            TransportEvent::Attached(handle) | TransportEvent::Detached(handle) => *handle,
        }
    }
}

/// Raw USB access used by the session layer
///
/// Descriptor reads are plain GET_DESCRIPTOR requests through
/// [`control_in`](Transport::control_in). String descriptors get their own
/// method since platforms decode them (language IDs, UTF-16) natively.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Handles of every device currently attached
    async fn devices(&self) -> TransportResult<Vec<DeviceHandle>>;

    async fn open(&self, handle: DeviceHandle) -> TransportResult<()>;

    async fn close(&self, handle: DeviceHandle) -> TransportResult<()>;

    /// Device-to-host control transfer of at most `length` bytes
    async fn control_in(
        &self,
        handle: DeviceHandle,
        request: ControlRequest,
        length: u16,
    ) -> TransportResult<Vec<u8>>;

    /// Host-to-device control transfer, returns bytes written
    async fn control_out(
        &self,
        handle: DeviceHandle,
        request: ControlRequest,
        data: &[u8],
    ) -> TransportResult<usize>;

    async fn string_descriptor(&self, handle: DeviceHandle, index: u8) -> TransportResult<String>;

    async fn set_configuration(&self, handle: DeviceHandle, value: u8) -> TransportResult<()>;

    async fn claim_interface(&self, handle: DeviceHandle, interface: u8) -> TransportResult<()>;

    async fn release_interface(&self, handle: DeviceHandle, interface: u8) -> TransportResult<()>;

    async fn set_alternate_setting(
        &self,
        handle: DeviceHandle,
        interface: u8,
        alternate: u8,
    ) -> TransportResult<()>;

    /// Bulk or interrupt IN transfer on `endpoint` (full address, bit 7 set)
    async fn transfer_in(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        length: usize,
    ) -> TransportResult<Vec<u8>>;

    /// Bulk or interrupt OUT transfer on `endpoint`, returns bytes written
    async fn transfer_out(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        data: &[u8],
    ) -> TransportResult<usize>;

    async fn reset(&self, handle: DeviceHandle) -> TransportResult<()>;
}
