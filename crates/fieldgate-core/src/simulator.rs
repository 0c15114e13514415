//! Built-in simulator driver.
//!
//! Generates tag values without any field hardware, for commissioning a
//! gateway before devices exist and for exercising the full pipeline in
//! tests. The waveform per tag is selected by the tag address:
//!
//! - `ramp:<low>:<high>` — sawtooth from low to high
//! - `sine:<amplitude>` — sine wave around zero
//! - `random:<low>:<high>` — uniform noise
//! - `static:<value>` — constant (writable)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use fieldgate_config::{ConfigError, DeviceConfig, TagConfig};

use crate::driver::{BrowseNode, DeviceDriver, DriverContext, PollOutcome};
use crate::error::DriverError;
use crate::pipeline;
use crate::types::{TagId, TagSample, Value};

/// Protocol identifier for the simulator.
pub const PROTOCOL: &str = "simulator";

// =============================================================================
// Waveforms
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Waveform {
    Ramp { low: f64, high: f64 },
    Sine { amplitude: f64 },
    Random { low: f64, high: f64 },
    Static { value: f64 },
}

impl Waveform {
    fn parse(address: &str) -> Result<Self, String> {
        let parts: Vec<&str> = address.split(':').collect();
        let num = |s: &str| -> Result<f64, String> {
            s.parse::<f64>().map_err(|_| format!("'{}' is not a number", s))
        };

        match parts.as_slice() {
            ["ramp", low, high] => Ok(Waveform::Ramp {
                low: num(low)?,
                high: num(high)?,
            }),
            ["sine", amplitude] => Ok(Waveform::Sine {
                amplitude: num(amplitude)?,
            }),
            ["random", low, high] => Ok(Waveform::Random {
                low: num(low)?,
                high: num(high)?,
            }),
            ["static", value] => Ok(Waveform::Static { value: num(value)? }),
            _ => Err(format!("unknown waveform address '{}'", address)),
        }
    }

    fn sample(&self, tick: u64) -> f64 {
        match *self {
            Waveform::Ramp { low, high } => {
                let width = high - low;
                if width <= 0.0 {
                    low
                } else {
                    low + (tick % 100) as f64 * width / 100.0
                }
            }
            Waveform::Sine { amplitude } => amplitude * (tick as f64 * 0.2).sin(),
            Waveform::Random { low, high } => {
                if high <= low {
                    low
                } else {
                    rand::thread_rng().gen_range(low..high)
                }
            }
            Waveform::Static { value } => value,
        }
    }
}

// =============================================================================
// SimulatorDriver
// =============================================================================

/// Driver that synthesizes tag values.
pub struct SimulatorDriver {
    name: String,
    tags: HashMap<String, TagConfig>,
    waves: HashMap<String, Waveform>,
    previous: HashMap<TagId, Value>,
    tick: u64,
    connected: bool,
}

impl SimulatorDriver {
    /// Creates a simulator for the device.
    pub fn new(device: Arc<DeviceConfig>) -> Self {
        let tags = device.tags.clone();
        let waves = Self::build_waves(&tags);
        Self {
            name: format!("simulator:{}", device.id),
            tags,
            waves,
            previous: HashMap::new(),
            tick: 0,
            connected: false,
        }
    }

    fn build_waves(tags: &HashMap<String, TagConfig>) -> HashMap<String, Waveform> {
        let mut waves = HashMap::new();
        for (id, tag) in tags {
            match Waveform::parse(&tag.address) {
                Ok(wave) => {
                    waves.insert(id.clone(), wave);
                }
                Err(reason) => {
                    warn!(tag_id = %id, %reason, "Invalid simulator address, tag will read null");
                }
            }
        }
        waves
    }
}

#[async_trait]
impl DeviceDriver for SimulatorDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), DriverError> {
        self.connected = true;
        debug!(driver = %self.name, "Simulator connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        self.connected = false;
        self.previous.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn poll(&mut self) -> Result<PollOutcome, DriverError> {
        if !self.connected {
            return Err(DriverError::NotConnected);
        }

        self.tick += 1;
        let mut outcome = PollOutcome::new();

        for (id, tag) in &self.tags {
            let tag_id = TagId::new(id.clone());

            let Some(wave) = self.waves.get(id) else {
                // A bad address is isolated to its tag.
                outcome.push(TagSample::null(tag_id, false));
                continue;
            };

            let raw = Value::Float(wave.sample(self.tick));
            match pipeline::compose(&raw, self.previous.get(&tag_id), tag) {
                Ok(composed) => {
                    self.previous.insert(tag_id.clone(), composed.value.clone());
                    outcome.push(TagSample::new(tag_id, composed.value, raw, composed.changed));
                }
                Err(e) => {
                    warn!(tag_id = %tag_id, error = %e, "Pipeline rejected sample");
                    outcome.push(TagSample::null(tag_id, false));
                }
            }
        }

        Ok(outcome)
    }

    async fn write(&mut self, tag_id: &TagId, value: Value) -> Result<bool, DriverError> {
        if !self.connected {
            return Err(DriverError::NotConnected);
        }
        let tag = self
            .tags
            .get(tag_id.as_str())
            .ok_or_else(|| DriverError::tag_not_found(tag_id.as_str()))?;

        let raw = pipeline::decompose(&value, tag)
            .map_err(|e| DriverError::write_failed(&tag.address, e.to_string()))?;
        let Some(raw_f) = raw.as_f64() else {
            return Err(DriverError::write_failed(
                &tag.address,
                "simulator tags accept only numeric writes",
            ));
        };

        // A written tag pins to the written raw value.
        self.waves
            .insert(tag_id.as_str().to_string(), Waveform::Static { value: raw_f });
        Ok(true)
    }

    fn supports_tag_reload(&self) -> bool {
        true
    }

    fn apply_tags(&mut self, tags: Vec<TagConfig>) {
        self.tags = tags.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.waves = Self::build_waves(&self.tags);
        self.previous.retain(|id, _| self.tags.contains_key(id.as_str()));
    }

    async fn browse(&mut self, node: Option<&str>) -> Result<Vec<BrowseNode>, DriverError> {
        if node.is_some() {
            return Ok(Vec::new());
        }
        let mut nodes: Vec<BrowseNode> = self
            .tags
            .values()
            .map(|t| BrowseNode::leaf(&t.address, &t.name).with_data_type("float"))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }
}

/// Registry constructor for the simulator protocol.
pub fn constructor(context: DriverContext) -> Result<Box<dyn DeviceDriver>, ConfigError> {
    Ok(Box::new(SimulatorDriver::new(context.device)))
}

// =============================================================================
// Tests
// =============================================================================
