//! Hot-plug watcher thread
//!
//! libusb delivers hot-plug callbacks only while something pumps
//! `handle_events`, so a dedicated thread registers the callback and runs
//! the event loop until stopped. Callbacks forward [`TransportEvent`]s into
//! an async channel consumed by [`session::Session::spawn_event_loop`].

use crate::transport::handle_of;
use async_channel::{Sender, TrySendError};
use rusb::{Context, Device, Hotplug, HotplugBuilder, UsbContext};
use session::TransportEvent;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Poll interval of the libusb event loop
const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Running hot-plug watcher
pub struct HotplugWatcher {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl HotplugWatcher {
    /// Start watching `context` for attach/detach, forwarding into `events`
    pub fn spawn(context: Context, events: Sender<TransportEvent>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("usb-hotplug".to_string())
            .spawn(move || run(context, events, thread_stop))?;

        Ok(Self { stop, thread })
    }

    /// Stop the event loop and wait for the thread to exit
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.thread.join().is_err() {
            warn!("Hot-plug thread panicked");
        }
    }
}

fn run(context: Context, events: Sender<TransportEvent>, stop: Arc<AtomicBool>) {
    if !rusb::has_hotplug() {
        warn!("libusb has no hot-plug support on this platform");
        return;
    }

    let callback = HotplugCallback { events };
    // Devices present at startup come from the initial listing
    let _registration: rusb::Registration<Context> = match HotplugBuilder::new()
        .enumerate(false)
        .register(&context, Box::new(callback))
    {
        Ok(registration) => registration,
        Err(e) => {
            warn!("Failed to register hot-plug callback: {}", e);
            return;
        }
    };

    info!("Hot-plug watcher started");
    while !stop.load(Ordering::Relaxed) {
        match context.handle_events(Some(EVENT_TIMEOUT)) {
            Ok(()) => {}
            Err(rusb::Error::Interrupted) => {
                debug!("USB event handling interrupted");
            }
            Err(e) => {
                warn!("Error handling USB events: {}", e);
                std::thread::sleep(EVENT_TIMEOUT);
            }
        }
    }
    info!("Hot-plug watcher stopped");
}

struct HotplugCallback {
    events: Sender<TransportEvent>,
}

impl HotplugCallback {
    fn forward(&self, event: TransportEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Hot-plug queue full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Hot-plug receiver gone");
            }
        }
    }
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        let handle = handle_of(&device);
        debug!("Hot-plug: device arrived ({})", handle);
        self.forward(TransportEvent::Attached(handle));
    }

    fn device_left(&mut self, device: Device<T>) {
        let handle = handle_of(&device);
        debug!("Hot-plug: device left ({})", handle);
        self.forward(TransportEvent::Detached(handle));
    }
}
