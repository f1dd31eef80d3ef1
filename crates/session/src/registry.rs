//! Live device registry
//!
//! Owns the snapshot and session state of every attached device. Each
//! entry carries an operation gate: callers hold it from their
//! precondition checks until the effect is applied, so operations on one
//! device run one at a time in the order they were issued. The registry
//! lock itself is only held for map access, never across transport I/O.

use crate::model::Device;
use protocol::DeviceHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Session-side state of one live device
#[derive(Debug, Clone)]
pub(crate) struct DeviceState {
    pub device: Device,
    pub opened: bool,
}

struct Entry {
    state: DeviceState,
    gate: Arc<Mutex<()>>,
}

/// Exclusive right to operate on one device, plus the state seen on entry
pub(crate) struct Lease {
    pub state: DeviceState,
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: RwLock<HashMap<DeviceHandle, Entry>>,
}

impl Registry {
    /// Add a freshly discovered device
    ///
    /// Returns false and keeps the existing entry if the handle is taken.
    pub async fn insert(&self, device: Device) -> bool {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&device.handle) {
            return false;
        }

        entries.insert(
            device.handle,
            Entry {
                state: DeviceState {
                    device,
                    opened: false,
                },
                gate: Arc::new(Mutex::new(())),
            },
        );
        true
    }

    /// Drop a device regardless of its open or claimed state
    pub async fn remove(&self, handle: DeviceHandle) -> Option<DeviceState> {
        self.entries
            .write()
            .await
            .remove(&handle)
            .map(|entry| entry.state)
    }

    pub async fn contains(&self, handle: DeviceHandle) -> bool {
        self.entries.read().await.contains_key(&handle)
    }

    pub async fn device(&self, handle: DeviceHandle) -> Option<Device> {
        self.entries
            .read()
            .await
            .get(&handle)
            .map(|entry| entry.state.device.clone())
    }

    pub async fn is_opened(&self, handle: DeviceHandle) -> Option<bool> {
        self.entries
            .read()
            .await
            .get(&handle)
            .map(|entry| entry.state.opened)
    }

    /// Snapshots of every live device, ordered by handle
    pub async fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .entries
            .read()
            .await
            .values()
            .map(|entry| entry.state.device.clone())
            .collect();
        devices.sort_by_key(|device| device.handle);
        devices
    }

    /// Wait for the device's gate and return its current state
    ///
    /// `None` when the device is not live, including when it was detached
    /// (or replaced by a new attach) while waiting.
    pub async fn lease(&self, handle: DeviceHandle) -> Option<Lease> {
        let gate = self.entries.read().await.get(&handle)?.gate.clone();
        let guard = gate.clone().lock_owned().await;

        let entries = self.entries.read().await;
        let entry = entries.get(&handle)?;
        if !Arc::ptr_eq(&entry.gate, &gate) {
            return None;
        }

        Some(Lease {
            state: entry.state.clone(),
            _guard: guard,
        })
    }

    /// Apply `f` to a live device's state
    ///
    /// `None` when the device is gone.
    pub async fn update<R>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&mut DeviceState) -> R,
    ) -> Option<R> {
        self.entries
            .write()
            .await
            .get_mut(&handle)
            .map(|entry| f(&mut entry.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_device;
    use std::time::Duration;

    #[tokio::test]
    async fn test_insert_is_first_wins() {
        let registry = Registry::default();
        let handle = DeviceHandle::new(1, 2);
        let mut device = sample_device(handle);

        assert!(registry.insert(device.clone()).await);
        device.vendor_id = 0xdead;
        assert!(!registry.insert(device).await);
        assert_ne!(registry.device(handle).await.unwrap().vendor_id, 0xdead);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let registry = Registry::default();
        let handle = DeviceHandle::new(1, 2);
        registry.insert(sample_device(handle)).await;

        registry.update(handle, |state| state.opened = true).await;
        assert_eq!(registry.is_opened(handle).await, Some(true));

        assert!(registry.remove(handle).await.is_some());
        assert!(!registry.contains(handle).await);
        assert!(registry.update(handle, |_| ()).await.is_none());
        assert!(registry.lease(handle).await.is_none());
    }

    #[tokio::test]
    async fn test_devices_sorted_by_handle() {
        let registry = Registry::default();
        registry.insert(sample_device(DeviceHandle::new(2, 1))).await;
        registry.insert(sample_device(DeviceHandle::new(1, 9))).await;
        registry.insert(sample_device(DeviceHandle::new(1, 3))).await;

        let handles: Vec<_> = registry.devices().await.iter().map(|d| d.handle).collect();
        assert_eq!(
            handles,
            vec![
                DeviceHandle::new(1, 3),
                DeviceHandle::new(1, 9),
                DeviceHandle::new(2, 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let registry = Arc::new(Registry::default());
        let handle = DeviceHandle::new(1, 2);
        registry.insert(sample_device(handle)).await;

        let lease = registry.lease(handle).await.unwrap();
        let waiting = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.lease(handle).await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(lease);
        assert!(waiting.await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_fails_after_reattach() {
        let registry = Arc::new(Registry::default());
        let handle = DeviceHandle::new(1, 2);
        registry.insert(sample_device(handle)).await;

        let lease = registry.lease(handle).await.unwrap();
        let waiting = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.lease(handle).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.remove(handle).await;
        registry.insert(sample_device(handle)).await;
        drop(lease);

        assert!(!waiting.await.unwrap());
    }
}
