//! ScriptLink protocol driver.
//!
//! Implements [`DeviceDriver`] for controllers whose poll response is a
//! script payload: each cycle requests the state script, executes it
//! through the extractor, resolves every configured tag's dotted address
//! against the resulting tree, and runs raw values through the tag value
//! pipeline. Writes render a small assignment script addressed by the same
//! path grammar.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use fieldgate_config::{ConfigError, DeviceConfig, TagConfig};
use fieldgate_core::driver::{BrowseNode, DeviceDriver, DriverContext, PollOutcome};
use fieldgate_core::{pipeline, DriverError, TagId, TagSample, Value};

use crate::client::{inflate_probe, FramedStreamClient};
use crate::extractor::{AddressPath, ScriptStateExtractor, StateValue};
use crate::types::{service, ScriptLinkConfig};

/// Protocol identifier for ScriptLink controllers.
pub const PROTOCOL: &str = "scriptlink";

// =============================================================================
// ScriptLinkDriver
// =============================================================================

/// Driver for one ScriptLink controller.
pub struct ScriptLinkDriver {
    name: String,
    device: Arc<DeviceConfig>,
    config: ScriptLinkConfig,
    client: FramedStreamClient,
    extractor: Option<ScriptStateExtractor>,
    tags: HashMap<String, TagConfig>,
    paths: HashMap<String, Option<AddressPath>>,
    previous: HashMap<TagId, Value>,
    last_state: Option<StateValue>,
}

impl ScriptLinkDriver {
    /// Creates a driver from the device configuration.
    pub fn new(device: Arc<DeviceConfig>, config: ScriptLinkConfig) -> Self {
        let tags = device.tags.clone();
        let paths = Self::parse_paths(&tags);
        Self {
            name: format!("scriptlink:{}", device.id),
            device,
            client: FramedStreamClient::new(config.clone()),
            config,
            extractor: None,
            tags,
            paths,
            previous: HashMap::new(),
            last_state: None,
        }
    }

    /// Parses every tag address once; invalid addresses read null and are
    /// reported a single time instead of every cycle.
    fn parse_paths(tags: &HashMap<String, TagConfig>) -> HashMap<String, Option<AddressPath>> {
        let mut paths = HashMap::new();
        for (id, tag) in tags {
            let path = match AddressPath::parse(&tag.address) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(tag_id = %id, error = %e, "Invalid tag address, tag will read null");
                    None
                }
            };
            paths.insert(id.clone(), path);
        }
        paths
    }

    /// Renders a value as controller script source.
    fn render_literal(value: &Value) -> Result<String, DriverError> {
        match value {
            Value::Bool(v) => Ok(v.to_string()),
            Value::Int(v) => Ok(v.to_string()),
            Value::Float(v) => Ok(format!("{:?}", v)),
            Value::String(v) => serde_json::to_string(v)
                .map_err(|e| DriverError::protocol(format!("unencodable string: {}", e))),
            Value::Null => Ok("()".to_string()),
        }
    }
}

#[async_trait]
impl DeviceDriver for ScriptLinkDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), DriverError> {
        self.client
            .connect(self.device.timeout())
            .await
            .map_err(DriverError::from)?;

        // A fresh interpreter per connection: state from the previous
        // session must not leak into this one.
        let extractor = ScriptStateExtractor::new(
            self.config.state_roots.clone(),
            self.config.max_state_depth,
        )
        .map_err(DriverError::from)?;
        self.extractor = Some(extractor);

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        self.client.disconnect().await;
        self.extractor = None;
        self.previous.clear();
        self.last_state = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected() && self.extractor.is_some()
    }

    async fn poll(&mut self) -> Result<PollOutcome, DriverError> {
        let extractor = self.extractor.as_mut().ok_or(DriverError::NotConnected)?;

        let response = self
            .client
            .request(service::STATE_REQUEST, &[])
            .await
            .map_err(DriverError::from)?;

        if response.service != service::STATE_RESPONSE {
            return Err(DriverError::protocol(format!(
                "unexpected service {:#04x} in state response",
                response.service
            )));
        }

        let payload = inflate_probe(&response.payload);
        let script = std::str::from_utf8(&payload)
            .map_err(|_| DriverError::protocol("state payload is not valid UTF-8"))?;

        // Unknown script content is tolerated; whatever state it populated
        // is still extracted.
        if let Err(e) = extractor.execute(script) {
            warn!(driver = %self.name, error = %e, "State script failed, extracting partial state");
        }

        let state = extractor.state();
        let mut outcome = PollOutcome::new();

        for (id, tag) in &self.tags {
            let tag_id = TagId::new(id.clone());

            let raw = self
                .paths
                .get(id)
                .and_then(|p| p.as_ref())
                .and_then(|path| state.resolve(path))
                .and_then(StateValue::scalar);

            let Some(raw) = raw else {
                // Unpopulated branch or bad address: no value for this tag.
                let changed = self
                    .previous
                    .insert(tag_id.clone(), Value::Null)
                    .is_some_and(|prev| !prev.is_null());
                outcome.push(TagSample::null(tag_id, changed));
                continue;
            };

            match pipeline::compose(&raw, self.previous.get(&tag_id), tag) {
                Ok(composed) => {
                    self.previous.insert(tag_id.clone(), composed.value.clone());
                    outcome.push(TagSample::new(tag_id, composed.value, raw, composed.changed));
                }
                Err(e) => {
                    // Isolated to this tag; the rest of the cycle continues.
                    warn!(tag_id = %tag_id, error = %e, "Pipeline rejected sample");
                    outcome.push(TagSample::null(tag_id, false));
                }
            }
        }

        self.last_state = Some(state);
        Ok(outcome)
    }

    async fn write(&mut self, tag_id: &TagId, value: Value) -> Result<bool, DriverError> {
        let tag = self
            .tags
            .get(tag_id.as_str())
            .ok_or_else(|| DriverError::tag_not_found(tag_id.as_str()))?;
        let path = self
            .paths
            .get(tag_id.as_str())
            .and_then(|p| p.as_ref())
            .ok_or_else(|| {
                DriverError::write_failed(&tag.address, "address does not parse")
            })?;

        let raw = pipeline::decompose(&value, tag)
            .map_err(|e| DriverError::write_failed(&tag.address, e.to_string()))?;

        let script = format!("{} = {};", path.to_script(), Self::render_literal(&raw)?);
        debug!(driver = %self.name, tag_id = %tag_id, %script, "Writing tag");

        let response = self
            .client
            .request(service::WRITE_REQUEST, script.as_bytes())
            .await
            .map_err(DriverError::from)?;

        if response.service != service::WRITE_ACK {
            return Err(DriverError::protocol(format!(
                "unexpected service {:#04x} in write acknowledgement",
                response.service
            )));
        }
        Ok(response.payload.first() == Some(&0x01))
    }

    fn supports_tag_reload(&self) -> bool {
        true
    }

    fn apply_tags(&mut self, tags: Vec<TagConfig>) {
        self.tags = tags.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.paths = Self::parse_paths(&self.tags);
        self.previous
            .retain(|id, _| self.tags.contains_key(id.as_str()));
    }

    async fn browse(&mut self, node: Option<&str>) -> Result<Vec<BrowseNode>, DriverError> {
        let state = self
            .last_state
            .as_ref()
            .ok_or_else(|| DriverError::unsupported("browse before first poll"))?;

        let subtree = match node {
            None => Some(state),
            Some(address) => {
                let path = AddressPath::parse(address)
                    .map_err(|e| DriverError::read_failed(address, e.to_string()))?;
                state.resolve(&path)
            }
        };

        let Some(children) = subtree.and_then(StateValue::children) else {
            return Ok(Vec::new());
        };

        let prefix = node.map(|n| format!("{}.", n)).unwrap_or_default();
        Ok(children
            .iter()
            .map(|(key, value)| {
                let id = format!("{}{}", prefix, key);
                if value.is_container() {
                    BrowseNode::container(id, key)
                } else {
                    let data_type = match value {
                        StateValue::Bool(_) => "bool",
                        StateValue::Int(_) => "int",
                        StateValue::Float(_) => "float",
                        StateValue::String(_) => "string",
                        StateValue::Map(_) => unreachable!(),
                    };
                    BrowseNode::leaf(id, key).with_data_type(data_type)
                }
            })
            .collect())
    }
}

impl std::fmt::Debug for ScriptLinkDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLinkDriver")
            .field("name", &self.name)
            .field("endpoint", &self.config.endpoint())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// =============================================================================
// Constructor
// =============================================================================

/// Registry constructor for the ScriptLink protocol.
pub fn constructor(context: DriverContext) -> Result<Box<dyn DeviceDriver>, ConfigError> {
    let config = ScriptLinkConfig::from_property(&context.device.id, &context.device.property)?;
    Ok(Box::new(ScriptLinkDriver::new(context.device, config)))
}

// =============================================================================
// Tests
// =============================================================================
