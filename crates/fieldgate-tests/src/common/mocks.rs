//! Mock drivers for testing FieldGate components in isolation.
//!
//! Behavior is controlled through a shared [`MockState`] handle, so tests
//! keep a grip on a driver even after the registry has boxed it away:
//! inject failures, stretch poll latency, and verify interaction counts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fieldgate_config::{ConfigError, DeviceConfig, TagConfig};
use fieldgate_core::driver::{DependencyLoader, DeviceDriver, DriverContext, PollOutcome};
use fieldgate_core::{pipeline, DeviceRegistry, DriverError, TagId, TagSample, Value};

// =============================================================================
// MockState
// =============================================================================

/// Shared control/observation handle for [`MockDriver`] instances.
#[derive(Debug, Default)]
pub struct MockState {
    /// Total connect calls.
    pub connects: AtomicU64,
    /// Total disconnect calls.
    pub disconnects: AtomicU64,
    /// Total poll calls.
    pub polls: AtomicU64,
    /// Total write calls.
    pub writes: AtomicU64,

    /// Force connects to fail.
    pub fail_connect: AtomicBool,
    /// Force polls to fail with a protocol error.
    pub fail_poll: AtomicBool,
    /// Artificial poll latency in milliseconds.
    pub poll_delay_ms: AtomicU64,
}

impl MockState {
    /// Creates a fresh handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the artificial poll latency.
    pub fn set_poll_delay(&self, delay: Duration) {
        self.poll_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

// =============================================================================
// MockDriver
// =============================================================================

/// A driver whose behavior is scripted through [`MockState`].
///
/// Each poll produces one sample per configured tag with a monotonically
/// increasing raw value, run through the real tag value pipeline.
pub struct MockDriver {
    name: String,
    state: Arc<MockState>,
    tags: HashMap<String, TagConfig>,
    previous: HashMap<TagId, Value>,
    counter: u64,
    connected: bool,
}

impl MockDriver {
    /// Creates a mock for the device, steered by `state`.
    pub fn new(device: &DeviceConfig, state: Arc<MockState>) -> Self {
        Self {
            name: format!("mock:{}", device.id),
            state,
            tags: device.tags.clone(),
            previous: HashMap::new(),
            counter: 0,
            connected: false,
        }
    }
}

#[async_trait]
impl DeviceDriver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), DriverError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::connection_failed("injected connect failure"));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        self.previous.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn poll(&mut self) -> Result<PollOutcome, DriverError> {
        self.state.polls.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(DriverError::NotConnected);
        }

        let delay = self.state.poll_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail_poll.load(Ordering::SeqCst) {
            return Err(DriverError::protocol("injected poll failure"));
        }

        self.counter += 1;
        let mut outcome = PollOutcome::new();
        for (id, tag) in &self.tags {
            let tag_id = TagId::new(id.clone());
            let raw = Value::Float(self.counter as f64);
            match pipeline::compose(&raw, self.previous.get(&tag_id), tag) {
                Ok(composed) => {
                    self.previous.insert(tag_id.clone(), composed.value.clone());
                    outcome.push(TagSample::new(tag_id, composed.value, raw, composed.changed));
                }
                Err(_) => outcome.push(TagSample::null(tag_id, false)),
            }
        }
        Ok(outcome)
    }

    async fn write(&mut self, tag_id: &TagId, _value: Value) -> Result<bool, DriverError> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(DriverError::NotConnected);
        }
        if !self.tags.contains_key(tag_id.as_str()) {
            return Err(DriverError::tag_not_found(tag_id.as_str()));
        }
        Ok(true)
    }

    fn supports_tag_reload(&self) -> bool {
        true
    }

    fn apply_tags(&mut self, tags: Vec<TagConfig>) {
        self.tags = tags.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.previous
            .retain(|id, _| self.tags.contains_key(id.as_str()));
    }
}

/// Registers a mock constructor under `protocol`, steered by `state`.
pub fn register_mock(registry: &DeviceRegistry, protocol: &str, state: Arc<MockState>) {
    registry.register_driver(protocol, move |context: DriverContext| {
        Ok(Box::new(MockDriver::new(&context.device, state.clone())) as Box<dyn DeviceDriver>)
    });
}

// =============================================================================
// Dependency-gated constructor
// =============================================================================

/// Registers a constructor that requires an external library from the
/// dependency loader, failing construction gracefully when it is absent.
pub fn register_dependent(registry: &DeviceRegistry, protocol: &str, dependency: &'static str) {
    let state = MockState::new();
    registry.register_driver(protocol, move |context: DriverContext| {
        if context.deps.load(dependency).is_none() {
            return Err(ConfigError::missing_dependency(&context.device.id, dependency));
        }
        Ok(Box::new(MockDriver::new(&context.device, state.clone())) as Box<dyn DeviceDriver>)
    });
}

/// A dependency loader backed by a fixed name set.
#[derive(Debug, Default)]
pub struct StaticDependencyLoader {
    available: Vec<String>,
}

impl StaticDependencyLoader {
    /// Creates a loader resolving exactly the given names.
    pub fn with(available: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            available: available.into_iter().map(Into::into).collect(),
        }
    }
}

impl DependencyLoader for StaticDependencyLoader {
    fn load(&self, name: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        self.available
            .iter()
            .any(|n| n == name)
            .then(|| Arc::new(()) as Arc<dyn std::any::Any + Send + Sync>)
    }
}
