//! Transfer engine
//!
//! Control, bulk and interrupt transfers with the session's validation in
//! front of the transport. Isochronous transfers are not supported.

use crate::error::{Missing, Operation, Result, SessionError};
use crate::model::{Configuration, Device, Endpoint, Interface};
use crate::session::{Session, ensure_claimed, ensure_opened};
use bytes::Bytes;
use protocol::{ControlRequest, ControlSetup, DeviceHandle, Direction, EndpointType, Recipient};
use serde::Serialize;
use tracing::debug;

/// Outcome of a completed transfer
///
/// Only `Ok` is reported: stalls and babble surface as transport errors
/// rather than as a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Ok,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InTransferResult {
    pub data: Bytes,
    pub status: TransferStatus,
}

impl InTransferResult {
    fn ok(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            status: TransferStatus::Ok,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutTransferResult {
    /// Always the full payload length; short writes are not reported
    pub bytes_written: usize,
    pub status: TransferStatus,
}

impl OutTransferResult {
    fn ok(bytes_written: usize) -> Self {
        Self {
            bytes_written,
            status: TransferStatus::Ok,
        }
    }
}

impl Session {
    pub async fn control_transfer_in(
        &self,
        handle: DeviceHandle,
        setup: ControlSetup,
        length: u16,
    ) -> Result<InTransferResult> {
        let op = Operation::ControlTransferIn;
        let lease = self.lease(handle, op).await?;
        ensure_opened(&lease, op)?;
        validate_setup(&lease.state.device, &setup, op)?;
        check_packet_size(&lease.state.device, length as usize, op)?;

        let data = self
            .transport
            .control_in(handle, setup.to_request(Direction::In), length)
            .await
            .map_err(SessionError::transport(op))?;

        debug!("Control IN on {}: {} bytes", handle, data.len());
        Ok(InTransferResult::ok(data))
    }

    pub async fn control_transfer_out(
        &self,
        handle: DeviceHandle,
        setup: ControlSetup,
        data: &[u8],
    ) -> Result<OutTransferResult> {
        let op = Operation::ControlTransferOut;
        let lease = self.lease(handle, op).await?;
        ensure_opened(&lease, op)?;
        validate_setup(&lease.state.device, &setup, op)?;
        check_packet_size(&lease.state.device, data.len(), op)?;

        self.transport
            .control_out(handle, setup.to_request(Direction::Out), data)
            .await
            .map_err(SessionError::transport(op))?;

        debug!("Control OUT on {}: {} bytes", handle, data.len());
        Ok(OutTransferResult::ok(data.len()))
    }

    /// Bulk or interrupt IN transfer on endpoint `endpoint` (number, 0-15)
    pub async fn transfer_in(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        length: usize,
    ) -> Result<InTransferResult> {
        let op = Operation::TransferIn;
        let lease = self.lease(handle, op).await?;
        let (interface, target) = find_endpoint(&lease.state.device, endpoint, Direction::In, op)?;
        ensure_bulk_or_interrupt(target, op)?;
        ensure_opened(&lease, op)?;
        ensure_claimed(interface, op)?;

        let data = self
            .transport
            .transfer_in(handle, target.address(), target.endpoint_type, length)
            .await
            .map_err(SessionError::transport(op))?;

        debug!(
            "{} IN on {} endpoint {:#04x}: {} bytes",
            target.endpoint_type,
            handle,
            target.address(),
            data.len()
        );
        Ok(InTransferResult::ok(data))
    }

    /// Bulk or interrupt OUT transfer on endpoint `endpoint` (number, 0-15)
    pub async fn transfer_out(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        data: &[u8],
    ) -> Result<OutTransferResult> {
        let op = Operation::TransferOut;
        let lease = self.lease(handle, op).await?;
        let (interface, target) =
            find_endpoint(&lease.state.device, endpoint, Direction::Out, op)?;
        ensure_bulk_or_interrupt(target, op)?;
        ensure_opened(&lease, op)?;
        ensure_claimed(interface, op)?;

        self.transport
            .transfer_out(handle, target.address(), target.endpoint_type, data)
            .await
            .map_err(SessionError::transport(op))?;

        debug!(
            "{} OUT on {} endpoint {:#04x}: {} bytes",
            target.endpoint_type,
            handle,
            target.address(),
            data.len()
        );
        Ok(OutTransferResult::ok(data.len()))
    }

    /// Clear a halted endpoint with CLEAR_FEATURE(ENDPOINT_HALT)
    pub async fn clear_halt(
        &self,
        handle: DeviceHandle,
        direction: Direction,
        endpoint: u8,
    ) -> Result<()> {
        let op = Operation::ClearHalt;
        let lease = self.lease(handle, op).await?;
        let (interface, target) = find_endpoint(&lease.state.device, endpoint, direction, op)?;
        ensure_opened(&lease, op)?;
        ensure_claimed(interface, op)?;

        self.transport
            .control_out(handle, ControlRequest::clear_halt(target.address()), &[])
            .await
            .map_err(SessionError::transport(op))?;

        debug!("Cleared halt on {} endpoint {:#04x}", handle, target.address());
        Ok(())
    }

    /// Not supported; fails once the device is known to be connected
    pub async fn isochronous_transfer_in(
        &self,
        handle: DeviceHandle,
        _endpoint: u8,
        _packet_lengths: &[usize],
    ) -> Result<Vec<InTransferResult>> {
        let operation = Operation::IsochronousTransferIn;
        self.lease(handle, operation).await?;
        Err(SessionError::NotImplemented { operation })
    }

    /// Not supported; fails once the device is known to be connected
    pub async fn isochronous_transfer_out(
        &self,
        handle: DeviceHandle,
        _endpoint: u8,
        _data: &[u8],
        _packet_lengths: &[usize],
    ) -> Result<Vec<OutTransferResult>> {
        let operation = Operation::IsochronousTransferOut;
        self.lease(handle, operation).await?;
        Err(SessionError::NotImplemented { operation })
    }
}

/// Check the recipient a control setup addresses
///
/// Interface and endpoint recipients must exist in the active
/// configuration and belong to a claimed interface.
fn validate_setup(device: &Device, setup: &ControlSetup, op: Operation) -> Result<()> {
    let interface = match setup.recipient {
        Recipient::Device | Recipient::Other => return Ok(()),
        Recipient::Interface => configured(device, op)?
            .interface(setup.target_interface())
            .ok_or(SessionError::validation(op, "interface not found"))?,
        Recipient::Endpoint => {
            configured(device, op)?
                .find_endpoint(setup.target_endpoint(), setup.target_direction())
                .ok_or(SessionError::validation(op, "endpoint not found"))?
                .0
        }
    };

    if !interface.claimed {
        return Err(SessionError::validation(op, "invalid state"));
    }
    Ok(())
}

fn check_packet_size(device: &Device, length: usize, op: Operation) -> Result<()> {
    if length > device.max_packet_size0 as usize {
        return Err(SessionError::validation(
            op,
            "length exceeds the maximum packet size",
        ));
    }
    Ok(())
}

fn configured(device: &Device, op: Operation) -> Result<&Configuration> {
    device
        .configuration()
        .ok_or(SessionError::invalid_state(op, "device not configured"))
}

fn find_endpoint(
    device: &Device,
    number: u8,
    direction: Direction,
    op: Operation,
) -> Result<(&Interface, &Endpoint)> {
    configured(device, op)?
        .find_endpoint(number, direction)
        .ok_or(SessionError::not_found(op, Missing::Endpoint))
}

fn ensure_bulk_or_interrupt(endpoint: &Endpoint, op: Operation) -> Result<()> {
    match endpoint.endpoint_type {
        EndpointType::Bulk | EndpointType::Interrupt => Ok(()),
        EndpointType::Isochronous => Err(SessionError::validation(op, "invalid access")),
    }
}
