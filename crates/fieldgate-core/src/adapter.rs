//! Per-device lifecycle state machine.
//!
//! Each device is owned by exactly one [`DeviceAdapter`], which runs a
//! single task driving the connect/poll/disconnect sequence:
//!
//! ```text
//! Init ──start()──▶ Connecting ──ok──▶ Connected ──poll ticks──┐
//!                      │  ▲                │                    │
//!                      │  └── retry period │ overload / failure │
//!                      ▼                   ▼                    │
//!                    Error ◀──────────── Busy                   │
//!                      │                                        │
//!                      └──────── stop() ──▶ Idle ◀──────────────┘
//! ```
//!
//! # Overload protection
//!
//! A poll tick that arrives while the previous cycle is still in flight is
//! rejected, not queued. After [`OVERLOAD_THRESHOLD`] consecutive
//! rejections the adapter emits a `Busy` status and force-disconnects to
//! recover from a stuck driver, converting an unbounded-queue risk into a
//! bounded, observable failure. The `working` flag and rejection counter
//! are adapter-owned state; the adapter task is their sole consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fieldgate_config::{DeviceConfig, TagConfig};

use crate::driver::{BrowseNode, DeviceDriver, PollOutcome};
use crate::error::DriverError;
use crate::events::{DeviceEvent, EventBus};
use crate::types::{DeviceId, DeviceStatus, TagId, TagSample, Value};

// =============================================================================
// Constants & Timing
// =============================================================================

/// Consecutive poll rejections that trip the overload guard.
pub const OVERLOAD_THRESHOLD: u32 = 3;

/// Consecutive poll failures (e.g. request timeouts) that force a reconnect.
/// A single timed-out request leaves the socket open for the next cycle.
pub const POLL_FAILURE_THRESHOLD: u32 = 3;

/// Adapter timing knobs.
///
/// The connect/request timeout comes from the device configuration; these
/// cover the supervisory retry period and teardown budget.
#[derive(Debug, Clone, Copy)]
pub struct AdapterTiming {
    /// Fixed period between reconnect attempts while in `Error` state.
    /// Deliberately not exponential: a periodic supervisor re-attempts the
    /// connection for as long as the device is commanded to run.
    pub retry_period: Duration,

    /// Extra budget for driver disconnect during teardown, on top of the
    /// device's own request timeout.
    pub disconnect_timeout: Duration,
}

impl Default for AdapterTiming {
    fn default() -> Self {
        Self {
            retry_period: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(2),
        }
    }
}

/// Start/stop command for the adapter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
}

// =============================================================================
// DeviceAdapter
// =============================================================================

/// Owns one device's driver instance and its lifecycle.
///
/// All driver operations funnel through this adapter: the driver contract
/// forbids concurrent invocations on one instance, and the adapter's
/// single-flight guard plus driver mutex enforce that. Cached values are
/// readable at any time without touching the network.
pub struct DeviceAdapter {
    /// Self-handle for spawning the run and poll tasks.
    me: Weak<DeviceAdapter>,
    device: parking_lot::RwLock<Arc<DeviceConfig>>,
    driver: Mutex<Box<dyn DeviceDriver>>,
    status: parking_lot::Mutex<DeviceStatus>,
    values: parking_lot::RwLock<HashMap<TagId, TagSample>>,
    events: Arc<EventBus>,
    timing: AdapterTiming,

    /// Single-flight guard: `true` while a poll cycle is in flight.
    working: AtomicBool,
    /// Consecutive poll-tick rejections.
    overload: AtomicU32,
    /// Consecutive failed poll cycles.
    poll_failures: AtomicU32,
    /// Connection generation; stale poll results are discarded.
    generation: AtomicU64,
    /// Set by a poll task to request a forced reconnect.
    recover_requested: AtomicBool,
    recover: Notify,

    cmd_tx: watch::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceAdapter {
    /// Creates an adapter with default timing.
    pub fn new(
        device: Arc<DeviceConfig>,
        driver: Box<dyn DeviceDriver>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Self::with_timing(device, driver, events, AdapterTiming::default())
    }

    /// Creates an adapter with explicit timing, mainly for tests.
    pub fn with_timing(
        device: Arc<DeviceConfig>,
        driver: Box<dyn DeviceDriver>,
        events: Arc<EventBus>,
        timing: AdapterTiming,
    ) -> Arc<Self> {
        let (cmd_tx, _) = watch::channel(Command::Stop);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            device: parking_lot::RwLock::new(device),
            driver: Mutex::new(driver),
            status: parking_lot::Mutex::new(DeviceStatus::Init),
            values: parking_lot::RwLock::new(HashMap::new()),
            events,
            timing,
            working: AtomicBool::new(false),
            overload: AtomicU32::new(0),
            poll_failures: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            recover_requested: AtomicBool::new(false),
            recover: Notify::new(),
            cmd_tx,
            task: Mutex::new(None),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the current device configuration.
    pub fn device(&self) -> Arc<DeviceConfig> {
        self.device.read().clone()
    }

    /// Returns the device ID.
    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(&self.device.read().id)
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> DeviceStatus {
        *self.status.lock()
    }

    /// Returns the cached samples. Never touches the network.
    pub fn values(&self) -> HashMap<TagId, TagSample> {
        self.values.read().clone()
    }

    /// Returns one cached sample. Never touches the network.
    pub fn value(&self, tag_id: &TagId) -> Option<TagSample> {
        self.values.read().get(tag_id).cloned()
    }

    /// Returns `true` if the adapter task is running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the adapter task. Starting a running adapter is a no-op.
    pub async fn start(&self) {
        let Some(adapter) = self.me.upgrade() else {
            return;
        };

        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!(device_id = %self.device_id(), "Start ignored: already running");
            return;
        }

        let _ = self.cmd_tx.send(Command::Start);
        let cmd_rx = self.cmd_tx.subscribe();
        *task = Some(tokio::spawn(adapter.run(cmd_rx)));
    }

    /// Stops the adapter task, waiting for teardown to finish. Stopping a
    /// stopped adapter is a no-op.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        let Some(handle) = handle else {
            debug!(device_id = %self.device_id(), "Stop ignored: not running");
            return;
        };

        let _ = self.cmd_tx.send(Command::Stop);
        let _ = handle.await;
    }

    /// Writes a value to a tag through the driver.
    ///
    /// The driver runs the inverse pipeline transform before sending. The
    /// call serializes with any in-flight poll via the driver lock and
    /// carries the device's request timeout.
    pub async fn write(&self, tag_id: &TagId, value: Value) -> Result<bool, DriverError> {
        let device = self.device();
        if !device.tags.contains_key(tag_id.as_str()) {
            return Err(DriverError::tag_not_found(tag_id.as_str()));
        }
        if !self.status().is_connected() {
            return Err(DriverError::NotConnected);
        }

        let mut driver = self.driver.lock().await;
        tokio::time::timeout(device.timeout(), driver.write(tag_id, value))
            .await
            .map_err(|_| DriverError::timeout(device.timeout()))?
    }

    /// Browses the driver's address space.
    pub async fn browse(&self, node: Option<&str>) -> Result<Vec<BrowseNode>, DriverError> {
        let mut driver = self.driver.lock().await;
        driver.browse(node).await
    }

    /// Replaces the tag set.
    ///
    /// Hot-reloads into the running driver when it supports that; otherwise
    /// the adapter is stop/start cycled. Returns `true` for a hot reload.
    pub async fn update_tags(&self, tags: HashMap<String, TagConfig>) -> bool {
        {
            let mut device = self.device.write();
            let mut updated = (**device).clone();
            updated.tags = tags.clone();
            *device = Arc::new(updated);
        }

        {
            let mut driver = self.driver.lock().await;
            if driver.supports_tag_reload() {
                driver.apply_tags(tags.into_values().collect());
                info!(device_id = %self.device_id(), "Tags hot-reloaded");
                return true;
            }
        }

        let was_running = self.is_running().await;
        if was_running {
            info!(device_id = %self.device_id(), "Tag update requires restart");
            self.stop().await;
            self.start().await;
        }
        false
    }

    // =========================================================================
    // Task body
    // =========================================================================

    async fn run(self: Arc<Self>, mut cmd: watch::Receiver<Command>) {
        let device_id = self.device_id();
        debug!(device_id = %device_id, "Device task started");

        loop {
            if *cmd.borrow() == Command::Stop {
                break;
            }

            // ---- connect phase ----
            let device = self.device();
            self.set_status(DeviceStatus::Connecting);

            // The timeout covers lock acquisition too: a stuck poll still
            // holding the driver must not stall the supervisor unboundedly.
            let connect_result = match tokio::time::timeout(device.timeout(), async {
                let mut driver = self.driver.lock().await;
                driver.connect().await
            })
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DriverError::timeout(device.timeout())),
            };

            if let Err(e) = connect_result {
                warn!(device_id = %device_id, error = %e, "Connect failed");
                self.set_status(DeviceStatus::Error);
                self.clear_values();
                if self.wait_for_stop(&mut cmd, self.timing.retry_period).await {
                    break;
                }
                continue;
            }

            info!(device_id = %device_id, "Device connected");
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.working.store(false, Ordering::SeqCst);
            self.overload.store(0, Ordering::SeqCst);
            self.poll_failures.store(0, Ordering::SeqCst);
            self.recover_requested.store(false, Ordering::SeqCst);
            self.set_status(DeviceStatus::Connected);

            // ---- poll phase ----
            let mut ticker = tokio::time::interval(self.device().polling());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut stopping = false;

            loop {
                tokio::select! {
                    changed = cmd.changed() => {
                        if changed.is_err() || *cmd.borrow() == Command::Stop {
                            stopping = true;
                            break;
                        }
                    }
                    _ = self.recover.notified() => {
                        if self.recover_requested.swap(false, Ordering::SeqCst) {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if self.working.swap(true, Ordering::SeqCst) {
                            let rejected = self.overload.fetch_add(1, Ordering::SeqCst) + 1;
                            warn!(
                                device_id = %device_id,
                                rejected,
                                "Poll rejected: previous cycle still in flight"
                            );
                            if rejected >= OVERLOAD_THRESHOLD {
                                self.set_status(DeviceStatus::Busy);
                                break;
                            }
                        } else {
                            self.spawn_poll();
                        }
                    }
                }
            }

            // Invalidate in-flight polls, then disconnect. The driver lock
            // makes teardown wait for an in-flight cycle to complete or hit
            // its own request timeout before the socket goes away.
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.disconnect_driver(&device).await;
            self.working.store(false, Ordering::SeqCst);
            self.overload.store(0, Ordering::SeqCst);

            if stopping || *cmd.borrow() == Command::Stop {
                break;
            }

            // Forced disconnect (overload or poll failure): keep the Busy
            // status visible through the retry wait, otherwise report Error.
            if self.status() != DeviceStatus::Busy {
                self.set_status(DeviceStatus::Error);
            }
            self.clear_values();
            if self.wait_for_stop(&mut cmd, self.timing.retry_period).await {
                break;
            }
        }

        self.clear_values();
        self.set_status(DeviceStatus::Idle);
        debug!(device_id = %device_id, "Device task stopped");
    }

    /// Spawns one poll cycle. The `working` flag is already claimed.
    fn spawn_poll(&self) {
        let Some(adapter) = self.me.upgrade() else {
            self.working.store(false, Ordering::SeqCst);
            return;
        };
        tokio::spawn(async move {
            let generation = adapter.generation.load(Ordering::SeqCst);

            let result = {
                let mut driver = adapter.driver.lock().await;
                // The connection may have turned over while we waited.
                if adapter.generation.load(Ordering::SeqCst) != generation {
                    adapter.working.store(false, Ordering::SeqCst);
                    return;
                }
                driver.poll().await
            };

            adapter.working.store(false, Ordering::SeqCst);

            if adapter.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            match result {
                Ok(outcome) => {
                    adapter.overload.store(0, Ordering::SeqCst);
                    adapter.poll_failures.store(0, Ordering::SeqCst);
                    adapter.apply_outcome(outcome);
                }
                Err(e) => {
                    let device_id = adapter.device_id();
                    warn!(device_id = %device_id, error = %e, "Poll failed");

                    let failures = adapter.poll_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if e.forces_reconnect() || failures >= POLL_FAILURE_THRESHOLD {
                        adapter.recover_requested.store(true, Ordering::SeqCst);
                        adapter.recover.notify_one();
                    }
                }
            }
        });
    }

    async fn disconnect_driver(&self, device: &DeviceConfig) {
        let budget = device.timeout() + self.timing.disconnect_timeout;
        let result = tokio::time::timeout(budget, async {
            let mut driver = self.driver.lock().await;
            driver.disconnect().await
        })
        .await;

        match result {
            Ok(Ok(())) => debug!(device_id = %device.id, "Device disconnected"),
            Ok(Err(e)) => warn!(device_id = %device.id, error = %e, "Disconnect failed"),
            Err(_) => warn!(device_id = %device.id, "Disconnect timed out"),
        }
    }

    async fn wait_for_stop(&self, cmd: &mut watch::Receiver<Command>, period: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(period) => false,
            changed = cmd.changed() => changed.is_err() || *cmd.borrow() == Command::Stop,
        }
    }

    fn apply_outcome(&self, outcome: PollOutcome) {
        if outcome.is_empty() {
            return;
        }
        {
            let mut values = self.values.write();
            for (tag_id, sample) in &outcome.samples {
                values.insert(tag_id.clone(), sample.clone());
            }
        }
        self.events.publish(DeviceEvent::ValuesChanged {
            device_id: self.device_id(),
            values: outcome.samples,
        });
    }

    /// Clears cached values, reporting known tags as null to subscribers.
    fn clear_values(&self) {
        let nulled: HashMap<TagId, TagSample> = {
            let mut values = self.values.write();
            if values.is_empty() {
                return;
            }
            let nulled = values
                .keys()
                .map(|k| (k.clone(), TagSample::null(k.clone(), false)))
                .collect();
            values.clear();
            nulled
        };
        self.events.publish(DeviceEvent::ValuesChanged {
            device_id: self.device_id(),
            values: nulled,
        });
    }

    /// Applies a status transition, publishing at most once per change.
    fn set_status(&self, status: DeviceStatus) {
        {
            let mut current = self.status.lock();
            if *current == status {
                return;
            }
            *current = status;
        }
        debug!(device_id = %self.device_id(), status = %status, "Status changed");
        self.events.publish(DeviceEvent::StatusChanged {
            device_id: self.device_id(),
            status,
        });
    }
}

impl std::fmt::Debug for DeviceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAdapter")
            .field("device_id", &self.device.read().id)
            .field("status", &self.status())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PollOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;

    /// Driver whose poll duration and outcomes are scripted.
    struct ScriptedDriver {
        connected: bool,
        fail_connect: bool,
        poll_delay: Duration,
        polls: Arc<AtomicU64>,
        disconnects: Arc<AtomicU64>,
    }

    impl ScriptedDriver {
        fn ok() -> Self {
            Self {
                connected: false,
                fail_connect: false,
                poll_delay: Duration::ZERO,
                polls: Arc::new(AtomicU64::new(0)),
                disconnects: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    #[async_trait]
    impl DeviceDriver for ScriptedDriver {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn connect(&mut self) -> Result<(), DriverError> {
            if self.fail_connect {
                return Err(DriverError::connection_failed("scripted failure"));
            }
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), DriverError> {
            self.connected = false;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn poll(&mut self) -> Result<PollOutcome, DriverError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if !self.poll_delay.is_zero() {
                tokio::time::sleep(self.poll_delay).await;
            }
            let mut outcome = PollOutcome::new();
            outcome.push(TagSample::new(
                TagId::new("t1"),
                Value::Float(1.0),
                Value::Float(1.0),
                true,
            ));
            Ok(outcome)
        }

        async fn write(&mut self, _tag_id: &TagId, _value: Value) -> Result<bool, DriverError> {
            Ok(true)
        }
    }

    fn device_config(polling_ms: u64) -> Arc<DeviceConfig> {
        Arc::new(DeviceConfig {
            id: "dev-1".to_string(),
            name: "Device 1".to_string(),
            protocol: "scripted".to_string(),
            enabled: true,
            polling_ms,
            timeout_ms: 500,
            property: serde_json::Value::Null,
            tags: HashMap::from([("t1".to_string(), TagConfig::new("t1", "addr"))]),
        })
    }

    fn fast_timing() -> AdapterTiming {
        AdapterTiming {
            retry_period: Duration::from_millis(50),
            disconnect_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_connect_and_poll_populates_cache() {
        let events = EventBus::new(64);
        let adapter = DeviceAdapter::with_timing(
            device_config(100),
            Box::new(ScriptedDriver::ok()),
            events.clone(),
            fast_timing(),
        );

        adapter.start().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(adapter.status(), DeviceStatus::Connected);
        let sample = adapter.value(&TagId::new("t1")).expect("cached sample");
        assert_eq!(sample.value, Value::Float(1.0));

        adapter.stop().await;
        assert_eq!(adapter.status(), DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let events = EventBus::new(64);
        let adapter = DeviceAdapter::with_timing(
            device_config(100),
            Box::new(ScriptedDriver::ok()),
            events,
            fast_timing(),
        );

        adapter.start().await;
        adapter.start().await;
        assert!(adapter.is_running().await);

        adapter.stop().await;
        adapter.stop().await;
        assert!(!adapter.is_running().await);
        assert_eq!(adapter.status(), DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure_goes_to_error_and_retries() {
        let events = EventBus::new(64);
        let mut driver = ScriptedDriver::ok();
        driver.fail_connect = true;
        let adapter = DeviceAdapter::with_timing(
            device_config(100),
            Box::new(driver),
            events,
            fast_timing(),
        );

        adapter.start().await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(adapter.status(), DeviceStatus::Error);

        // Still in Error after a retry period: the supervisor keeps trying.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(adapter.status(), DeviceStatus::Error);

        adapter.stop().await;
        assert_eq!(adapter.status(), DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn test_overload_guard_forces_busy() {
        let events = EventBus::new(256);
        let mut sub = events.subscribe();

        let mut driver = ScriptedDriver::ok();
        // Each poll takes far longer than the interval: ticks 2..4 are
        // rejected, the third rejection trips the guard.
        driver.poll_delay = Duration::from_millis(400);
        let polls = driver.polls.clone();

        let adapter = DeviceAdapter::with_timing(
            device_config(100),
            Box::new(driver),
            events.clone(),
            fast_timing(),
        );

        adapter.start().await;

        let mut saw_busy = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while tokio::time::Instant::now() < deadline {
            let event = tokio::time::timeout_at(deadline, sub.recv_skip_lag()).await;
            match event {
                Ok(Ok(DeviceEvent::StatusChanged {
                    status: DeviceStatus::Busy,
                    ..
                })) => {
                    saw_busy = true;
                    break;
                }
                Ok(Ok(_)) => {}
                _ => break,
            }
        }

        assert!(saw_busy, "overload guard should emit Busy");
        // Only the first poll ran; the rejected ticks never reached the driver.
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        adapter.stop().await;
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let events = EventBus::new(64);
        let adapter = DeviceAdapter::with_timing(
            device_config(100),
            Box::new(ScriptedDriver::ok()),
            events,
            fast_timing(),
        );

        let err = adapter
            .write(&TagId::new("t1"), Value::Float(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotConnected));

        let err = adapter
            .write(&TagId::new("missing"), Value::Float(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::TagNotFound { .. }));
    }

    #[tokio::test]
    async fn test_stop_clears_values() {
        let events = EventBus::new(64);
        let adapter = DeviceAdapter::with_timing(
            device_config(100),
            Box::new(ScriptedDriver::ok()),
            events,
            fast_timing(),
        );

        adapter.start().await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!adapter.values().is_empty());

        adapter.stop().await;
        assert!(adapter.values().is_empty());
    }
}
