//! Script-state extraction.
//!
//! ScriptLink controllers deliver their state as executable script text:
//! running the payload populates named tables describing every unit,
//! channel, and property of the device. The extractor executes that text in
//! an isolated, resource-bounded interpreter and reads a bounded set of
//! globals back as a plain tree of maps and scalar leaves.
//!
//! The input is the trusted controller's own firmware output, not user
//! code: the interpreter is resource-bounded (operation count, call depth,
//! value sizes) but deliberately not hardened as a general sandbox.
//!
//! Unknown identifiers resolve to inert empty maps so a script referencing
//! optional subsystems still runs to completion; residual evaluation errors
//! are reported to the caller, which logs them and extracts whatever state
//! was populated.

use std::collections::BTreeMap;
use std::fmt;

use rhai::{Dynamic, Engine, Map, Scope};
use tracing::debug;

use fieldgate_core::Value;

use crate::error::{ScriptLinkError, ScriptLinkResult};

/// Operation budget per script execution.
const MAX_OPERATIONS: u64 = 500_000;

/// Maximum script call nesting.
const MAX_CALL_DEPTH: usize = 32;

// =============================================================================
// StateValue
// =============================================================================

/// One node of the extracted state tree: nested maps with scalar leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// Boolean leaf.
    Bool(bool),
    /// Integer leaf.
    Int(i64),
    /// Float leaf.
    Float(f64),
    /// String leaf.
    String(String),
    /// Container node. Array elements appear under their decimal index.
    Map(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Returns `true` for container nodes.
    pub fn is_container(&self) -> bool {
        matches!(self, StateValue::Map(_))
    }

    /// Returns the leaf as a core [`Value`], or `None` for containers.
    pub fn scalar(&self) -> Option<Value> {
        match self {
            StateValue::Bool(v) => Some(Value::Bool(*v)),
            StateValue::Int(v) => Some(Value::Int(*v)),
            StateValue::Float(v) => Some(Value::Float(*v)),
            StateValue::String(v) => Some(Value::String(v.clone())),
            StateValue::Map(_) => None,
        }
    }

    /// Resolves a dotted path against this node.
    ///
    /// Unresolvable paths yield `None` rather than an error: the
    /// controller's state tree may legitimately omit unpopulated branches.
    pub fn resolve(&self, path: &AddressPath) -> Option<&StateValue> {
        let mut node = self;
        for segment in &path.segments {
            let StateValue::Map(map) = node else {
                return None;
            };
            node = match segment {
                PathSegment::Key(key) => map.get(key)?,
                PathSegment::Index(index) => map.get(&index.to_string())?,
            };
        }
        Some(node)
    }

    /// Lists the children of a container node.
    pub fn children(&self) -> Option<&BTreeMap<String, StateValue>> {
        match self {
            StateValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

// =============================================================================
// AddressPath
// =============================================================================

/// One segment of a dotted address path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Named table entry.
    Key(String),
    /// Numeric array/table index.
    Index(usize),
}

/// A parsed tag address: `ident ( "." (ident | index) )*`, with `[index]`
/// accepted as an alternate index spelling and normalized away.
///
/// # Grammar
///
/// ```text
/// path    := ident segment*
/// segment := "." ident | "." index | "[" index "]"
/// ident   := [A-Za-z_][A-Za-z0-9_]*
/// index   := [0-9]+
/// ```
///
/// # Examples
///
/// ```
/// use fieldgate_scriptlink::AddressPath;
///
/// let a = AddressPath::parse("Device.Unit.3.Setpoint").unwrap();
/// let b = AddressPath::parse("Device.Unit[3].Setpoint").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPath {
    /// The path segments, root first.
    pub segments: Vec<PathSegment>,
}

impl AddressPath {
    /// Parses an address string.
    ///
    /// # Errors
    ///
    /// [`ScriptLinkError::InvalidAddress`] on anything outside the grammar.
    pub fn parse(address: &str) -> ScriptLinkResult<Self> {
        let invalid =
            |message: &str| ScriptLinkError::invalid_address(address, message.to_string());

        if address.is_empty() {
            return Err(invalid("empty address"));
        }

        let mut segments = Vec::new();
        let bytes = address.as_bytes();
        let mut pos = 0;

        // Leading segment must be an identifier.
        let (first, next) = Self::take_ident(bytes, pos)
            .ok_or_else(|| invalid("must start with an identifier"))?;
        segments.push(PathSegment::Key(first));
        pos = next;

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    pos += 1;
                    if let Some((ident, next)) = Self::take_ident(bytes, pos) {
                        segments.push(PathSegment::Key(ident));
                        pos = next;
                    } else if let Some((index, next)) = Self::take_index(bytes, pos) {
                        segments.push(PathSegment::Index(index));
                        pos = next;
                    } else {
                        return Err(invalid("expected identifier or index after '.'"));
                    }
                }
                b'[' => {
                    pos += 1;
                    let (index, next) = Self::take_index(bytes, pos)
                        .ok_or_else(|| invalid("expected index after '['"))?;
                    if next >= bytes.len() || bytes[next] != b']' {
                        return Err(invalid("unterminated index bracket"));
                    }
                    segments.push(PathSegment::Index(index));
                    pos = next + 1;
                }
                _ => return Err(invalid("expected '.' or '['")),
            }
        }

        Ok(Self { segments })
    }

    fn take_ident(bytes: &[u8], start: usize) -> Option<(String, usize)> {
        let mut pos = start;
        if pos >= bytes.len() || !(bytes[pos].is_ascii_alphabetic() || bytes[pos] == b'_') {
            return None;
        }
        pos += 1;
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
            pos += 1;
        }
        // Safe: all consumed bytes are ASCII.
        Some((String::from_utf8_lossy(&bytes[start..pos]).into_owned(), pos))
    }

    fn take_index(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
        let mut pos = start;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == start {
            return None;
        }
        let index = std::str::from_utf8(&bytes[start..pos]).ok()?.parse().ok()?;
        Some((index, pos))
    }

    /// Renders the path as script source for the controller's write path,
    /// with indexes in bracket form: `Device.Unit[3].Setpoint`.
    pub fn to_script(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => {
                    if i > 0 {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for AddressPath {
    /// Canonical dotted form: `Device.Unit.3.Setpoint`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Key(key) => f.write_str(key)?,
                PathSegment::Index(index) => write!(f, "{}", index)?,
            }
        }
        Ok(())
    }
}

// =============================================================================
// ScriptStateExtractor
// =============================================================================

/// Long-lived interpreter instance for one device connection.
///
/// The scope persists across executions so each state response overwrites
/// the previous one cleanly; the extractor is dropped and recreated on
/// disconnect.
pub struct ScriptStateExtractor {
    engine: Engine,
    scope: Scope<'static>,
    roots: Vec<String>,
    max_depth: usize,
}

impl ScriptStateExtractor {
    /// Creates an extractor reading back the given globals.
    ///
    /// # Errors
    ///
    /// [`ScriptLinkError::ScriptInit`] when the interpreter cannot be set
    /// up with the requested bounds. Unlike execution failures, this is a
    /// hard error: the connection is unusable without an interpreter.
    pub fn new(roots: Vec<String>, max_depth: usize) -> ScriptLinkResult<Self> {
        if roots.is_empty() {
            return Err(ScriptLinkError::script_init("no state roots configured"));
        }
        if max_depth == 0 {
            return Err(ScriptLinkError::script_init("state depth bound cannot be zero"));
        }

        let mut engine = Engine::new();

        engine.on_progress(|count| {
            if count > MAX_OPERATIONS {
                Some("operation limit exceeded".into())
            } else {
                None
            }
        });
        engine.set_max_call_levels(MAX_CALL_DEPTH);
        engine.set_max_expr_depths(64, 64);
        engine.set_max_string_size(1 << 20);
        engine.set_max_array_size(64 * 1024);
        engine.set_max_map_size(64 * 1024);

        // Unknown identifiers become inert empty maps: controller scripts
        // may reference subsystems this device does not have.
        engine.on_var(|name, _index, context| {
            if context.scope().contains(name) {
                Ok(None)
            } else {
                Ok(Some(Dynamic::from(Map::new())))
            }
        });

        let mut scope = Scope::new();
        for root in &roots {
            scope.push(root.clone(), Map::new());
        }

        Ok(Self {
            engine,
            scope,
            roots,
            max_depth,
        })
    }

    /// Executes a state script against the persistent scope.
    ///
    /// # Errors
    ///
    /// [`ScriptLinkError::ScriptExec`] when evaluation fails. The scope
    /// keeps whatever the script populated before failing, so callers can
    /// log the error and still extract.
    pub fn execute(&mut self, script: &str) -> ScriptLinkResult<()> {
        self.engine
            .run_with_scope(&mut self.scope, script)
            .map_err(|e| ScriptLinkError::script_exec(e.to_string()))
    }

    /// Reads the configured globals back as a state tree.
    ///
    /// Containers nested deeper than the depth bound are truncated, which
    /// also defends against pathologically deep structures.
    pub fn state(&self) -> StateValue {
        let mut map = BTreeMap::new();
        for root in &self.roots {
            if let Some(dynamic) = self.scope.get(root) {
                if let Some(value) = dynamic_to_state(dynamic, 1, self.max_depth) {
                    map.insert(root.clone(), value);
                } else {
                    debug!(root = %root, "State root not representable, skipped");
                }
            }
        }
        StateValue::Map(map)
    }
}

impl fmt::Debug for ScriptStateExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptStateExtractor")
            .field("roots", &self.roots)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Converts a rhai value into a [`StateValue`], bounded by depth.
fn dynamic_to_state(dynamic: &Dynamic, depth: usize, max_depth: usize) -> Option<StateValue> {
    if let Ok(v) = dynamic.as_bool() {
        return Some(StateValue::Bool(v));
    }
    if let Ok(v) = dynamic.as_int() {
        return Some(StateValue::Int(v));
    }
    if let Ok(v) = dynamic.as_float() {
        return Some(StateValue::Float(v));
    }
    if dynamic.is_string() {
        return dynamic
            .clone()
            .into_string()
            .ok()
            .map(StateValue::String);
    }

    if depth >= max_depth {
        return None;
    }

    if let Some(map) = dynamic.clone().try_cast::<Map>() {
        let mut out = BTreeMap::new();
        for (key, value) in &map {
            if let Some(v) = dynamic_to_state(value, depth + 1, max_depth) {
                out.insert(key.to_string(), v);
            }
        }
        return Some(StateValue::Map(out));
    }

    if let Some(array) = dynamic.clone().try_cast::<rhai::Array>() {
        let mut out = BTreeMap::new();
        for (index, value) in array.iter().enumerate() {
            if let Some(v) = dynamic_to_state(value, depth + 1, max_depth) {
                out.insert(index.to_string(), v);
            }
        }
        return Some(StateValue::Map(out));
    }

    None
}

// =============================================================================
// Tests
// =============================================================================
