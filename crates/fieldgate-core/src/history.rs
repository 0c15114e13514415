//! History sink boundary and write gating.
//!
//! Persistence backends live outside the core; they are reached through the
//! narrow [`HistorySink`] trait and never block polling. The
//! [`HistoryGate`] applies the per-tag write-worthiness predicate
//! ([`crate::pipeline::should_persist`]) and tracks last-persisted times.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use fieldgate_config::TagConfig;

use crate::error::HistoryError;
use crate::pipeline::should_persist;
use crate::types::{DeviceId, TagId, TagSample};

// =============================================================================
// HistorySink Trait
// =============================================================================

/// The boundary to an external history store.
///
/// Writes are fire-and-forget from the core's perspective: the forwarder
/// task awaits them off the polling path, and failures are logged, never
/// propagated into a poll cycle.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persists a batch of samples for one device.
    async fn write(
        &self,
        device_id: &DeviceId,
        device_name: &str,
        samples: &HashMap<TagId, TagSample>,
    ) -> Result<(), HistoryError>;
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistorySink;

#[async_trait]
impl HistorySink for NoopHistorySink {
    async fn write(
        &self,
        _device_id: &DeviceId,
        _device_name: &str,
        _samples: &HashMap<TagId, TagSample>,
    ) -> Result<(), HistoryError> {
        Ok(())
    }
}

// =============================================================================
// MemoryHistorySink
// =============================================================================

/// One persisted batch.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The device the batch belongs to.
    pub device_id: DeviceId,
    /// The device's display name at write time.
    pub device_name: String,
    /// The persisted samples.
    pub samples: HashMap<TagId, TagSample>,
    /// When the batch was written.
    pub written_at: DateTime<Utc>,
}

/// A bounded in-memory history sink for tests and commissioning.
#[derive(Debug)]
pub struct MemoryHistorySink {
    entries: Mutex<Vec<HistoryEntry>>,
    capacity: usize,
}

impl MemoryHistorySink {
    /// Creates a sink holding at most `capacity` batches; the oldest batch
    /// is evicted when full.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Returns all stored batches.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    /// Returns the number of stored batches.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns every persisted sample of one tag, oldest first.
    pub fn samples_for(&self, device_id: &DeviceId, tag_id: &TagId) -> Vec<TagSample> {
        self.entries
            .lock()
            .iter()
            .filter(|e| &e.device_id == device_id)
            .filter_map(|e| e.samples.get(tag_id).cloned())
            .collect()
    }
}

impl Default for MemoryHistorySink {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl HistorySink for MemoryHistorySink {
    async fn write(
        &self,
        device_id: &DeviceId,
        device_name: &str,
        samples: &HashMap<TagId, TagSample>,
    ) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.remove(0);
        }
        entries.push(HistoryEntry {
            device_id: device_id.clone(),
            device_name: device_name.to_string(),
            samples: samples.clone(),
            written_at: Utc::now(),
        });
        Ok(())
    }
}

// =============================================================================
// HistoryGate
// =============================================================================

/// Applies the write-worthiness predicate to each poll cycle's samples.
///
/// The gate remembers when each tag was last persisted so the minimum DAQ
/// interval can re-admit unchanged samples. State is per gateway, keyed by
/// device and tag.
#[derive(Debug, Default)]
pub struct HistoryGate {
    last_persisted: HashMap<(DeviceId, TagId), DateTime<Utc>>,
}

impl HistoryGate {
    /// Creates an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters a cycle's samples down to those worth persisting and records
    /// their persistence time.
    pub fn filter(
        &mut self,
        device_id: &DeviceId,
        samples: &HashMap<TagId, TagSample>,
        tags: &HashMap<String, TagConfig>,
        now: DateTime<Utc>,
    ) -> HashMap<TagId, TagSample> {
        let mut passed = HashMap::new();

        for (tag_id, sample) in samples {
            let Some(tag) = tags.get(tag_id.as_str()) else {
                continue;
            };

            let key = (device_id.clone(), tag_id.clone());
            let last = self.last_persisted.get(&key).copied();

            if should_persist(sample, tag, last, now) {
                self.last_persisted.insert(key, now);
                passed.insert(tag_id.clone(), sample.clone());
            }
        }

        passed
    }

    /// Forgets persistence times for a device, e.g. after it is removed.
    pub fn forget_device(&mut self, device_id: &DeviceId) {
        self.last_persisted.retain(|(d, _), _| d != device_id);
    }
}

// =============================================================================
// Tests
// =============================================================================
