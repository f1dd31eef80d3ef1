//! libusb-backed transport
//!
//! rusb calls block, so every operation runs on the tokio blocking pool.
//! Opened handles are kept per device behind their own lock; the session
//! already serializes operations on one device, so the lock is only held
//! by one caller at a time in practice.

use async_trait::async_trait;
use protocol::{ControlRequest, DeviceHandle, EndpointType};
use rusb::{Context, Device, UsbContext};
use session::{Transport, TransportError, TransportResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for a single USB request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

type SharedHandle = Arc<Mutex<rusb::DeviceHandle<Context>>>;

/// [`Transport`] over a libusb context
pub struct RusbTransport {
    context: Context,
    handles: Mutex<HashMap<DeviceHandle, SharedHandle>>,
    timeout: Duration,
}

impl RusbTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self::with_context(context, timeout))
    }

    pub fn with_context(context: Context, timeout: Duration) -> Self {
        Self {
            context,
            handles: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// libusb context, shared with the hot-plug watcher
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn opened(&self, handle: DeviceHandle) -> TransportResult<SharedHandle> {
        self.handles
            .lock()
            .map_err(|_| poisoned())?
            .get(&handle)
            .cloned()
            .ok_or(TransportError::NotFound)
    }

    /// Run `f` against the opened handle of `handle` on the blocking pool
    async fn with_handle<T, F>(&self, handle: DeviceHandle, f: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusb::DeviceHandle<Context>, Duration) -> rusb::Result<T> + Send + 'static,
    {
        let device = self.opened(handle)?;
        let timeout = self.timeout;
        blocking(move || {
            let mut device = device.lock().map_err(|_| poisoned())?;
            f(&mut device, timeout).map_err(map_rusb_error)
        })
        .await
    }
}

#[async_trait]
impl Transport for RusbTransport {
    async fn devices(&self) -> TransportResult<Vec<DeviceHandle>> {
        let context = self.context.clone();
        blocking(move || {
            let list = context.devices().map_err(map_rusb_error)?;
            Ok(list.iter().map(|device| handle_of(&device)).collect())
        })
        .await
    }

    async fn open(&self, handle: DeviceHandle) -> TransportResult<()> {
        if self.opened(handle).is_ok() {
            return Ok(());
        }

        let context = self.context.clone();
        let opened = blocking(move || {
            let device = find_device(&context, handle).map_err(map_rusb_error)?;
            let mut opened = device.open().map_err(map_rusb_error)?;
            // Kernel drivers are detached on claim and reattached on release
            if let Err(e) = opened.set_auto_detach_kernel_driver(true) {
                debug!("Auto-detach of kernel drivers unavailable on {}: {}", handle, e);
            }
            Ok(opened)
        })
        .await?;

        self.handles
            .lock()
            .map_err(|_| poisoned())?
            .insert(handle, Arc::new(Mutex::new(opened)));
        debug!("Opened device {}", handle);
        Ok(())
    }

    async fn close(&self, handle: DeviceHandle) -> TransportResult<()> {
        let removed = self.handles.lock().map_err(|_| poisoned())?.remove(&handle);
        if removed.is_some() {
            // Dropping the last reference closes the libusb handle
            debug!("Closed device {}", handle);
        }
        Ok(())
    }

    async fn control_in(
        &self,
        handle: DeviceHandle,
        request: ControlRequest,
        length: u16,
    ) -> TransportResult<Vec<u8>> {
        self.with_handle(handle, move |device, timeout| {
            let mut buf = vec![0u8; length as usize];
            let read = device.read_control(
                request.request_type,
                request.request,
                request.value,
                request.index,
                &mut buf,
                timeout,
            )?;
            buf.truncate(read);
            Ok(buf)
        })
        .await
    }

    async fn control_out(
        &self,
        handle: DeviceHandle,
        request: ControlRequest,
        data: &[u8],
    ) -> TransportResult<usize> {
        let data = data.to_vec();
        self.with_handle(handle, move |device, timeout| {
            device.write_control(
                request.request_type,
                request.request,
                request.value,
                request.index,
                &data,
                timeout,
            )
        })
        .await
    }

    async fn string_descriptor(&self, handle: DeviceHandle, index: u8) -> TransportResult<String> {
        self.with_handle(handle, move |device, timeout| {
            let languages = device.read_languages(timeout)?;
            match languages.first() {
                Some(language) => device.read_string_descriptor(*language, index, timeout),
                None => device.read_string_descriptor_ascii(index),
            }
        })
        .await
    }

    async fn set_configuration(&self, handle: DeviceHandle, value: u8) -> TransportResult<()> {
        self.with_handle(handle, move |device, _| device.set_active_configuration(value))
            .await
    }

    async fn claim_interface(&self, handle: DeviceHandle, interface: u8) -> TransportResult<()> {
        self.with_handle(handle, move |device, _| device.claim_interface(interface))
            .await
    }

    async fn release_interface(&self, handle: DeviceHandle, interface: u8) -> TransportResult<()> {
        self.with_handle(handle, move |device, _| device.release_interface(interface))
            .await
    }

    async fn set_alternate_setting(
        &self,
        handle: DeviceHandle,
        interface: u8,
        alternate: u8,
    ) -> TransportResult<()> {
        self.with_handle(handle, move |device, _| {
            device.set_alternate_setting(interface, alternate)
        })
        .await
    }

    async fn transfer_in(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        length: usize,
    ) -> TransportResult<Vec<u8>> {
        self.with_handle(handle, move |device, timeout| {
            let mut buf = vec![0u8; length];
            let read = match kind {
                EndpointType::Bulk => device.read_bulk(endpoint, &mut buf, timeout)?,
                EndpointType::Interrupt => device.read_interrupt(endpoint, &mut buf, timeout)?,
                EndpointType::Isochronous => return Err(rusb::Error::NotSupported),
            };
            buf.truncate(read);
            Ok(buf)
        })
        .await
    }

    async fn transfer_out(
        &self,
        handle: DeviceHandle,
        endpoint: u8,
        kind: EndpointType,
        data: &[u8],
    ) -> TransportResult<usize> {
        let data = data.to_vec();
        self.with_handle(handle, move |device, timeout| match kind {
            EndpointType::Bulk => device.write_bulk(endpoint, &data, timeout),
            EndpointType::Interrupt => device.write_interrupt(endpoint, &data, timeout),
            EndpointType::Isochronous => Err(rusb::Error::NotSupported),
        })
        .await
    }

    async fn reset(&self, handle: DeviceHandle) -> TransportResult<()> {
        self.with_handle(handle, |device, _| device.reset()).await
    }
}

/// Bus/address handle of a libusb device
pub fn handle_of<T: UsbContext>(device: &Device<T>) -> DeviceHandle {
    DeviceHandle::new(device.bus_number(), device.address())
}

fn find_device(context: &Context, handle: DeviceHandle) -> rusb::Result<Device<Context>> {
    context
        .devices()?
        .iter()
        .find(|device| handle_of(device) == handle)
        .ok_or(rusb::Error::NoDevice)
}

async fn blocking<T, F>(f: F) -> TransportResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TransportResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap_or_else(|e| {
        warn!("USB task failed: {}", e);
        Err(TransportError::Other(e.to_string()))
    })
}

fn poisoned() -> TransportError {
    TransportError::Other("device table lock poisoned".to_string())
}

/// Map rusb error to [`TransportError`]
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::NotFound => TransportError::NotFound,
        rusb::Error::Busy => TransportError::Busy,
        rusb::Error::Overflow => TransportError::Overflow,
        rusb::Error::Io => TransportError::Io,
        rusb::Error::InvalidParam => TransportError::InvalidParam,
        rusb::Error::Access => TransportError::Access,
        rusb::Error::NotSupported => TransportError::Unsupported,
        _ => TransportError::Other(err.to_string()),
    }
}
