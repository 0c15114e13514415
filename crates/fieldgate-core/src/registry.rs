//! Device registry: the authoritative set of configured devices.
//!
//! The registry owns one [`DeviceAdapter`] per configured device, fans out
//! lifecycle commands, and forwards history-worthy samples to the
//! [`HistorySink`]. The device map is the only structure touched from
//! multiple tasks; it lives in a `DashMap` so concurrent `load`/`start`/
//! `stop` calls never observe a half-updated set.
//!
//! A device that fails to construct (unknown protocol, missing dependency,
//! bad properties) is recorded with `Error` status and excluded from
//! polling; it never aborts loading of the other devices.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use fieldgate_config::{ConfigError, DeviceConfig, TagConfig};

use crate::adapter::{AdapterTiming, DeviceAdapter};
use crate::driver::{
    BrowseNode, DependencyLoader, DeviceDriver, DriverContext, DriverRegistry,
    NoExternalDependencies,
};
use crate::error::{BusError, DriverError};
use crate::events::{DeviceEvent, EventBus, EventSubscriber};
use crate::history::{HistoryGate, HistorySink};
use crate::types::{DeviceId, DeviceStatus, TagId, TagSample, Value};

// =============================================================================
// DeviceEntry
// =============================================================================

/// One registered device.
///
/// `adapter` is `None` when driver construction failed; the device then
/// reports `Error` status and is excluded from polling.
struct DeviceEntry {
    config: Arc<DeviceConfig>,
    adapter: Option<Arc<DeviceAdapter>>,
}

// =============================================================================
// DeviceRegistry
// =============================================================================

/// Owns the configured device set and multiplexes driver events to
/// subscribers and the history sink.
pub struct DeviceRegistry {
    /// Self-handle for spawning the history forwarder task.
    me: Weak<DeviceRegistry>,
    devices: DashMap<DeviceId, DeviceEntry>,
    drivers: parking_lot::RwLock<DriverRegistry>,
    events: Arc<EventBus>,
    history: Arc<dyn HistorySink>,
    deps: Arc<dyn DependencyLoader>,
    timing: AdapterTiming,
    forwarder: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DeviceRegistry {
    /// Creates a registry with default timing and no external dependencies.
    pub fn new(history: Arc<dyn HistorySink>) -> Arc<Self> {
        Self::with_options(history, Arc::new(NoExternalDependencies), AdapterTiming::default())
    }

    /// Creates a registry with explicit dependency loader and timing.
    pub fn with_options(
        history: Arc<dyn HistorySink>,
        deps: Arc<dyn DependencyLoader>,
        timing: AdapterTiming,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            devices: DashMap::new(),
            drivers: parking_lot::RwLock::new(DriverRegistry::new()),
            events: EventBus::new(1024),
            history,
            deps,
            timing,
            forwarder: parking_lot::Mutex::new(None),
        })
    }

    /// Registers a driver constructor for a protocol identifier.
    pub fn register_driver<F>(&self, protocol: impl Into<String>, constructor: F)
    where
        F: Fn(DriverContext) -> Result<Box<dyn DeviceDriver>, ConfigError> + Send + Sync + 'static,
    {
        self.drivers.write().register(protocol, constructor);
    }

    /// Returns the registered protocol identifiers.
    pub fn supported_protocols(&self) -> Vec<String> {
        self.drivers.read().supported_protocols()
    }

    /// Subscribes to status and value events.
    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads a full device set.
    ///
    /// Devices whose definition is unchanged keep their adapter. A changed
    /// definition stops and discards the old adapter before a fresh one is
    /// constructed. Devices no longer present are stopped and removed.
    /// Returns the number of devices with a working adapter.
    pub async fn load(&self, configs: Vec<DeviceConfig>) -> usize {
        let incoming: HashSet<DeviceId> =
            configs.iter().map(|c| DeviceId::new(&c.id)).collect();

        // Remove devices absent from the new set.
        let removed: Vec<DeviceId> = self
            .devices
            .iter()
            .map(|e| e.key().clone())
            .filter(|id| !incoming.contains(id))
            .collect();
        for id in removed {
            if let Some((_, entry)) = self.devices.remove(&id) {
                if let Some(adapter) = entry.adapter {
                    adapter.stop().await;
                }
                info!(device_id = %id, "Device removed");
            }
        }

        let mut loaded = 0;
        for config in configs {
            let id = DeviceId::new(&config.id);

            if let Some(entry) = self.devices.get(&id) {
                if *entry.config == config {
                    if entry.adapter.is_some() {
                        loaded += 1;
                    }
                    continue;
                }
            }

            // Definition changed (or new): stop-and-discard, then rebuild.
            if let Some((_, old)) = self.devices.remove(&id) {
                if let Some(adapter) = old.adapter {
                    adapter.stop().await;
                }
            }

            let config = Arc::new(config);
            let context = DriverContext::with_deps(config.clone(), self.deps.clone());
            let adapter = match self.drivers.read().create(context) {
                Ok(driver) => {
                    loaded += 1;
                    Some(DeviceAdapter::with_timing(
                        config.clone(),
                        driver,
                        self.events.clone(),
                        self.timing,
                    ))
                }
                Err(e) => {
                    error!(device_id = %id, error = %e, "Driver construction failed");
                    self.events.publish(DeviceEvent::StatusChanged {
                        device_id: id.clone(),
                        status: DeviceStatus::Error,
                    });
                    None
                }
            };

            self.devices.insert(id, DeviceEntry { config, adapter });
        }

        info!(
            devices = self.devices.len(),
            working = loaded,
            "Device set loaded"
        );
        loaded
    }

    // =========================================================================
    // Lifecycle commands
    // =========================================================================

    /// Starts a device. Idempotent; disabled and construction-failed
    /// devices are skipped with a log line.
    pub async fn start(&self, device_id: &DeviceId) -> Result<(), DriverError> {
        let (adapter, enabled) = {
            let entry = self
                .devices
                .get(device_id)
                .ok_or_else(|| DriverError::device_not_found(device_id.as_str()))?;
            (entry.adapter.clone(), entry.config.enabled)
        };

        let Some(adapter) = adapter else {
            warn!(device_id = %device_id, "Start skipped: driver construction failed");
            return Ok(());
        };
        if !enabled {
            info!(device_id = %device_id, "Start skipped: device disabled");
            return Ok(());
        }

        adapter.start().await;
        Ok(())
    }

    /// Stops a device. Idempotent.
    pub async fn stop(&self, device_id: &DeviceId) -> Result<(), DriverError> {
        let adapter = {
            let entry = self
                .devices
                .get(device_id)
                .ok_or_else(|| DriverError::device_not_found(device_id.as_str()))?;
            entry.adapter.clone()
        };

        if let Some(adapter) = adapter {
            adapter.stop().await;
        }
        Ok(())
    }

    /// Starts every enabled device.
    pub async fn start_all(&self) {
        for id in self.device_ids() {
            let _ = self.start(&id).await;
        }
    }

    /// Stops every device.
    pub async fn stop_all(&self) {
        for id in self.device_ids() {
            let _ = self.stop(&id).await;
        }
    }

    /// Replaces a running device's tag set, hot-reloading when the driver
    /// supports it. Returns `true` for a hot reload.
    pub async fn update_tags(
        &self,
        device_id: &DeviceId,
        tags: HashMap<String, TagConfig>,
    ) -> Result<bool, DriverError> {
        let adapter = {
            let mut entry = self
                .devices
                .get_mut(device_id)
                .ok_or_else(|| DriverError::device_not_found(device_id.as_str()))?;

            let mut updated = (*entry.config).clone();
            updated.tags = tags.clone();
            entry.config = Arc::new(updated);
            entry.adapter.clone()
        };

        let Some(adapter) = adapter else {
            return Err(DriverError::device_not_found(device_id.as_str()));
        };
        Ok(adapter.update_tags(tags).await)
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Returns a device's status. Construction-failed devices report
    /// `Error`.
    pub fn status(&self, device_id: &DeviceId) -> Option<DeviceStatus> {
        self.devices.get(device_id).map(|entry| {
            entry
                .adapter
                .as_ref()
                .map_or(DeviceStatus::Error, |a| a.status())
        })
    }

    /// Returns the status of every device.
    pub fn statuses(&self) -> HashMap<DeviceId, DeviceStatus> {
        self.devices
            .iter()
            .map(|entry| {
                let status = entry
                    .value()
                    .adapter
                    .as_ref()
                    .map_or(DeviceStatus::Error, |a| a.status());
                (entry.key().clone(), status)
            })
            .collect()
    }

    /// Returns a device's cached samples without touching the network.
    pub fn values(&self, device_id: &DeviceId) -> Option<HashMap<TagId, TagSample>> {
        self.devices
            .get(device_id)
            .and_then(|entry| entry.adapter.as_ref().map(|a| a.values()))
    }

    /// Returns one cached sample without touching the network.
    pub fn value(&self, device_id: &DeviceId, tag_id: &TagId) -> Option<TagSample> {
        self.devices
            .get(device_id)
            .and_then(|entry| entry.adapter.as_ref().and_then(|a| a.value(tag_id)))
    }

    /// Writes a value to a device tag.
    pub async fn write(
        &self,
        device_id: &DeviceId,
        tag_id: &TagId,
        value: Value,
    ) -> Result<bool, DriverError> {
        let adapter = self
            .devices
            .get(device_id)
            .and_then(|entry| entry.adapter.clone())
            .ok_or_else(|| DriverError::device_not_found(device_id.as_str()))?;
        adapter.write(tag_id, value).await
    }

    /// Browses a device's address space.
    pub async fn browse(
        &self,
        device_id: &DeviceId,
        node: Option<&str>,
    ) -> Result<Vec<BrowseNode>, DriverError> {
        let adapter = self
            .devices
            .get(device_id)
            .and_then(|entry| entry.adapter.clone())
            .ok_or_else(|| DriverError::device_not_found(device_id.as_str()))?;
        adapter.browse(node).await
    }

    /// Returns the registered device IDs.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|e| e.key().clone()).collect()
    }

    /// Returns the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // =========================================================================
    // History forwarding
    // =========================================================================

    /// Starts the history forwarder task.
    ///
    /// The forwarder subscribes to value events, applies the per-tag
    /// write-worthiness predicate, and hands passing samples to the history
    /// sink. It runs off the polling path: a slow sink can never stall a
    /// poll cycle.
    pub fn start_history(&self) {
        let Some(registry) = self.me.upgrade() else {
            return;
        };

        let mut forwarder = self.forwarder.lock();
        if forwarder.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut subscriber = self.events.subscribe();
        *forwarder = Some(tokio::spawn(async move {
            let mut gate = HistoryGate::new();
            loop {
                match subscriber.recv_skip_lag().await {
                    Ok(DeviceEvent::ValuesChanged { device_id, values }) => {
                        let Some((name, tags)) = registry.devices.get(&device_id).map(|e| {
                            (e.config.name.clone(), e.config.tags.clone())
                        }) else {
                            gate.forget_device(&device_id);
                            continue;
                        };

                        let worthy = gate.filter(&device_id, &values, &tags, Utc::now());
                        if worthy.is_empty() {
                            continue;
                        }
                        if let Err(e) = registry.history.write(&device_id, &name, &worthy).await {
                            warn!(device_id = %device_id, error = %e, "History write failed");
                        }
                    }
                    Ok(DeviceEvent::StatusChanged { .. }) => {}
                    Err(BusError::Closed) => break,
                    Err(_) => {}
                }
            }
        }));
    }

    /// Stops everything: all devices, then the history forwarder.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.device_count())
            .field("protocols", &self.supported_protocols())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
