//! Gateway runtime orchestration.
//!
//! Wires the components together in order: configuration, driver
//! registration, device loading, history forwarding, polling, and graceful
//! shutdown.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use fieldgate_config::{load_config, GatewayConfig};
use fieldgate_core::{DeviceRegistry, HistorySink, MemoryHistorySink};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// GatewayRuntime
// =============================================================================

/// The main gateway runtime.
pub struct GatewayRuntime {
    config: Arc<GatewayConfig>,
    history: Arc<dyn HistorySink>,
    shutdown: ShutdownCoordinator,
    start_devices: bool,
}

impl GatewayRuntime {
    /// Creates a runtime for the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
            history: Arc::new(MemoryHistorySink::default()),
            shutdown: ShutdownCoordinator::new(),
            start_devices: true,
        }
    }

    /// Replaces the history sink (an external store in production; the
    /// in-memory sink otherwise).
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    /// Loads devices without starting them.
    pub fn skip_start(mut self, skip: bool) -> Self {
        self.start_devices = !skip;
        self
    }

    /// Returns the shutdown coordinator, e.g. for tests to trigger
    /// shutdown manually.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the gateway until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            gateway_id = %self.config.gateway.id,
            version = fieldgate_core::VERSION,
            "Starting FieldGate"
        );

        let registry = self.build_registry();

        let loaded = registry.load(self.config.devices.clone()).await;
        info!(
            devices = self.config.devices.len(),
            working = loaded,
            "Devices loaded"
        );

        registry.start_history();
        if self.start_devices {
            registry.start_all().await;
        }

        info!(gateway_id = %self.config.gateway.id, "FieldGate is ready");
        self.shutdown.wait_for_shutdown().await;

        info!("Shutdown initiated, stopping devices...");
        registry.shutdown().await;
        info!("FieldGate shutdown complete");

        Ok(())
    }

    /// Builds the device registry with every in-tree driver registered.
    fn build_registry(&self) -> Arc<DeviceRegistry> {
        let registry = DeviceRegistry::new(self.history.clone());
        registry.register_driver(
            fieldgate_core::simulator::PROTOCOL,
            fieldgate_core::simulator::constructor,
        );
        registry.register_driver(fieldgate_scriptlink::PROTOCOL, fieldgate_scriptlink::constructor);
        registry
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for the gateway runtime.
pub struct RuntimeBuilder {
    config_path: Option<std::path::PathBuf>,
    config: Option<GatewayConfig>,
    skip_start: bool,
}

impl RuntimeBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_path: None,
            config: None,
            skip_start: false,
        }
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads devices without starting them.
    pub fn skip_start(mut self, skip: bool) -> Self {
        self.skip_start = skip;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<GatewayRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::Configuration("no configuration provided".into()))?;
                load_config(&path).map_err(|e| {
                    BinError::Configuration(format!("failed to load {}: {}", path.display(), e))
                })?
            }
        };

        Ok(GatewayRuntime::new(config).skip_start(self.skip_start))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
