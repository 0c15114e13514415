//! Core data types for FieldGate.
//!
//! Protocol-agnostic types shared by every component: identifiers, the tag
//! value representation, per-poll samples, and the device status enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// A unique identifier for a device.
///
/// Device IDs are stable across restarts and unique within a gateway
/// instance.
///
/// # Examples
///
/// ```
/// use fieldgate_core::types::DeviceId;
///
/// let id = DeviceId::new("plc-001");
/// assert_eq!(id.as_str(), "plc-001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device ID.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unique identifier for a tag within a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Creates a new tag ID.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TagId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TagId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Value
// =============================================================================

/// A tag value.
///
/// Numeric and string shapes are never silently coerced into one another;
/// the pipeline surfaces a type mismatch instead.
///
/// # Examples
///
/// ```
/// use fieldgate_core::types::Value;
///
/// let temp = Value::Float(25.5);
/// assert_eq!(temp.as_f64(), Some(25.5));
/// assert!(temp.is_numeric());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// UTF-8 string value.
    String(String),
    /// No value (unknown, unread, or cleared).
    Null,
}

impl Value {
    /// Returns the type name of this value.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Null => "null",
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` if this is a numeric value.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Attempts to read this value as a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to read this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Attempts to read this value as an f64.
    ///
    /// Booleans and strings do not convert; the pipeline treats them as a
    /// type mismatch rather than guessing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to read this value as a string slice.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// =============================================================================
// TagSample
// =============================================================================

/// One poll-cycle reading of a tag.
///
/// Samples are ephemeral: the adapter's cache holds the latest sample per
/// tag and overwrites it every cycle. Only samples passing the history
/// gating predicate reach the history sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSample {
    /// The tag this sample belongs to.
    pub tag_id: TagId,

    /// Engineering value after the pipeline transform.
    pub value: Value,

    /// Raw value as read from the device.
    pub raw_value: Value,

    /// Whether the value changed past the deadband since the previous cycle.
    pub changed: bool,

    /// When the sample was produced.
    pub timestamp: DateTime<Utc>,
}

impl TagSample {
    /// Creates a sample with the current timestamp.
    pub fn new(tag_id: TagId, value: Value, raw_value: Value, changed: bool) -> Self {
        Self {
            tag_id,
            value,
            raw_value,
            changed,
            timestamp: Utc::now(),
        }
    }

    /// Creates a null sample, used when a tag could not be resolved.
    pub fn null(tag_id: TagId, changed: bool) -> Self {
        Self::new(tag_id, Value::Null, Value::Null, changed)
    }
}

impl fmt::Display for TagSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}{} @ {}",
            self.tag_id,
            self.value,
            if self.changed { " (changed)" } else { "" },
            self.timestamp.format("%H:%M:%S%.3f")
        )
    }
}

// =============================================================================
// DeviceStatus
// =============================================================================

/// The lifecycle status of a device.
///
/// Transitions are owned exclusively by the device's adapter:
/// `Init → Idle → Connecting → {Connected | Error} → Idle` on stop, with
/// `Busy` reported when the overload guard trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Device has been constructed but never started.
    #[default]
    Init,

    /// Device is stopped.
    Idle,

    /// A connect attempt is in progress.
    Connecting,

    /// Device is connected and polling.
    Connected,

    /// Connect or poll failed; the supervisor retries while started.
    Error,

    /// The overload guard tripped: polls piled up and the adapter forced a
    /// disconnect to recover.
    Busy,
}

impl DeviceStatus {
    /// Returns `true` if the device is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceStatus::Connected)
    }

    /// Returns `true` if the device is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, DeviceStatus::Connecting)
    }

    /// Returns `true` if the device is in a failure state.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, DeviceStatus::Error | DeviceStatus::Busy)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Init => "init",
            DeviceStatus::Idle => "idle",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Error => "error",
            DeviceStatus::Busy => "busy",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Tests
// =============================================================================
