//! Tag value transformation pipeline.
//!
//! Pure functions that turn raw device readings into reportable engineering
//! values and back:
//!
//! - [`compose`]: raw → engineering (scale, round, deadband change detection)
//! - [`decompose`]: engineering → raw (inverse scaling, used before writes)
//! - [`should_persist`]: history-write-worthiness predicate
//!
//! All scaling arithmetic is `f64`. Values are never silently coerced
//! between numeric and string shapes; a mismatch is a [`PipelineError`]
//! surfaced to the caller.

use chrono::{DateTime, Utc};

use fieldgate_config::TagConfig;

use crate::error::PipelineError;
use crate::types::{TagSample, Value};

// =============================================================================
// ComposedValue
// =============================================================================

/// The result of composing a raw reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedValue {
    /// The engineering value.
    pub value: Value,
    /// Whether the value changed past the deadband since the previous cycle.
    pub changed: bool,
}

// =============================================================================
// compose
// =============================================================================

/// Transforms a raw reading into an engineering value and decides whether it
/// counts as changed.
///
/// Scaling maps `raw_low..raw_high` linearly onto `scaled_low..scaled_high`;
/// a zero-width raw range skips scaling instead of dividing by zero. The
/// result is rounded to `format` decimals. The deadband threshold applies to
/// the absolute delta against `previous`: the delta must exceed
/// `deadband.value`, not merely be non-zero, to suppress noise.
///
/// The first sample for a tag (no `previous`) is always changed.
///
/// # Errors
///
/// [`PipelineError::NotNumeric`] if a scaling transform is configured but
/// the raw value is not numeric.
pub fn compose(
    raw: &Value,
    previous: Option<&Value>,
    tag: &TagConfig,
) -> Result<ComposedValue, PipelineError> {
    let Some(raw_f) = raw.as_f64() else {
        if tag.scale.is_some() {
            return Err(PipelineError::not_numeric(&tag.id, raw.type_name()));
        }
        // Non-numeric tags pass through; any difference counts as a change.
        let changed = previous.map_or(!raw.is_null(), |p| p != raw);
        return Ok(ComposedValue {
            value: raw.clone(),
            changed,
        });
    };

    let mut value = raw_f;
    let mut transformed = false;

    if let Some(scale) = &tag.scale {
        let raw_width = scale.raw_width();
        if raw_width != 0.0 {
            value = scale.scaled_low + (value - scale.raw_low) * scale.scaled_width() / raw_width;
            transformed = true;
        }
    }

    if let Some(decimals) = tag.format {
        value = round_to(value, decimals);
        transformed = true;
    }

    let changed = match previous.and_then(Value::as_f64) {
        Some(prev) => match tag.deadband {
            Some(db) if db.value > 0.0 => (value - prev).abs() > db.value,
            _ => value != prev,
        },
        None => true,
    };

    // Keep the integer shape for untransformed integer reads.
    let value = if !transformed && matches!(raw, Value::Int(_)) {
        Value::Int(value as i64)
    } else {
        Value::Float(value)
    };

    Ok(ComposedValue { value, changed })
}

// =============================================================================
// decompose
// =============================================================================

/// Transforms an engineering value back into the raw value to write to the
/// device (inverse of [`compose`]'s scaling; rounding is not inverted).
///
/// # Errors
///
/// [`PipelineError::NotNumeric`] if a scaling transform is configured but
/// the value is not numeric.
pub fn decompose(value: &Value, tag: &TagConfig) -> Result<Value, PipelineError> {
    let Some(scale) = &tag.scale else {
        return Ok(value.clone());
    };

    let Some(v) = value.as_f64() else {
        return Err(PipelineError::not_numeric(&tag.id, value.type_name()));
    };

    let scaled_width = scale.scaled_width();
    if scaled_width == 0.0 {
        return Ok(Value::Float(v));
    }

    let raw = scale.raw_low + (v - scale.scaled_low) * scale.raw_width() / scaled_width;
    Ok(Value::Float(raw))
}

// =============================================================================
// should_persist
// =============================================================================

/// Decides whether a sample is worth writing to the history sink.
///
/// Returns `true` when DAQ is enabled for the tag and either the
/// only-on-change policy is off, the sample changed, or the minimum DAQ
/// interval has elapsed since the last persisted sample of this tag.
pub fn should_persist(
    sample: &TagSample,
    tag: &TagConfig,
    last_persisted: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if !tag.daq.enabled {
        return false;
    }
    if !tag.daq.changed || sample.changed {
        return true;
    }
    match last_persisted {
        None => true,
        Some(last) => now - last >= chrono::Duration::seconds(tag.daq.interval_s as i64),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Rounds to the given number of decimal places.
fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fieldgate_config::{DaqConfig, ScaleConfig};
    use crate::types::TagId;

    fn scaled_tag() -> TagConfig {
        TagConfig::new("level", "reg:0")
            .with_scale(ScaleConfig::new(0.0, 4095.0, 0.0, 100.0))
            .with_format(1)
    }

    #[test]
    fn test_linear_scaling() {
        let tag = scaled_tag();
        let out = compose(&Value::Int(2048), None, &tag).unwrap();
        assert_eq!(out.value, Value::Float(50.0));
        assert!(out.changed);
    }

    #[test]
    fn test_deadband_holds_value() {
        let tag = scaled_tag().with_deadband(1.0);
        let first = compose(&Value::Int(2048), None, &tag).unwrap();
        assert_eq!(first.value, Value::Float(50.0));

        // 2049 scales to ~50.02, within the 1.0 deadband of 50.0.
        let second = compose(&Value::Int(2049), Some(&first.value), &tag).unwrap();
        assert!(!second.changed);
    }

    #[test]
    fn test_deadband_sequence() {
        // Scaled values 10.0, 10.2, 10.6 with deadband 0.5 -> true, false, true.
        let tag = TagConfig::new("t", "a").with_deadband(0.5).with_format(1);

        let a = compose(&Value::Float(10.0), None, &tag).unwrap();
        assert!(a.changed);

        let b = compose(&Value::Float(10.2), Some(&a.value), &tag).unwrap();
        assert!(!b.changed);

        // Cached value stays at the last *changed* value, 10.0.
        let c = compose(&Value::Float(10.6), Some(&a.value), &tag).unwrap();
        assert!(c.changed);
    }

    #[test]
    fn test_deadband_requires_exceeding_threshold() {
        // A delta exactly at the deadband does not count as changed.
        let tag = TagConfig::new("t", "a").with_deadband(0.5);
        let out = compose(&Value::Float(10.5), Some(&Value::Float(10.0)), &tag).unwrap();
        assert!(!out.changed);
    }

    #[test]
    fn test_no_deadband_any_delta_counts() {
        let tag = TagConfig::new("t", "a");
        let out = compose(&Value::Float(10.0001), Some(&Value::Float(10.0)), &tag).unwrap();
        assert!(out.changed);
        let same = compose(&Value::Float(10.0), Some(&Value::Float(10.0)), &tag).unwrap();
        assert!(!same.changed);
    }

    #[test]
    fn test_zero_width_raw_range_skips_scaling() {
        let tag =
            TagConfig::new("t", "a").with_scale(ScaleConfig::new(5.0, 5.0, 0.0, 100.0));
        let out = compose(&Value::Float(7.5), None, &tag).unwrap();
        assert_eq!(out.value, Value::Float(7.5));
    }

    #[test]
    fn test_scaling_roundtrip() {
        let tag = TagConfig::new("t", "a")
            .with_scale(ScaleConfig::new(0.0, 4095.0, -50.0, 150.0))
            .with_format(2);

        for raw in [0.0, 17.0, 1024.0, 2048.0, 4095.0] {
            let composed = compose(&Value::Float(raw), None, &tag).unwrap();
            let back = decompose(&composed.value, &tag).unwrap();
            // Rounding to 2 decimals bounds the roundtrip error in raw units.
            let tolerance = 0.005 * 4095.0 / 200.0 + 1e-9;
            assert!(
                (back.as_f64().unwrap() - raw).abs() <= tolerance,
                "raw {} came back as {:?}",
                raw,
                back
            );
        }
    }

    #[test]
    fn test_decompose_without_scale_passes_through() {
        let tag = TagConfig::new("t", "a");
        let out = decompose(&Value::Float(42.0), &tag).unwrap();
        assert_eq!(out, Value::Float(42.0));

        let out = decompose(&Value::String("on".into()), &tag).unwrap();
        assert_eq!(out, Value::String("on".into()));
    }

    #[test]
    fn test_scale_rejects_non_numeric() {
        let tag = scaled_tag();
        let err = compose(&Value::String("high".into()), None, &tag).unwrap_err();
        assert!(matches!(err, PipelineError::NotNumeric { .. }));

        let err = decompose(&Value::Bool(true), &tag).unwrap_err();
        assert!(matches!(err, PipelineError::NotNumeric { .. }));
    }

    #[test]
    fn test_string_tags_pass_through() {
        let tag = TagConfig::new("state", "a");
        let first = compose(&Value::String("run".into()), None, &tag).unwrap();
        assert!(first.changed);
        assert_eq!(first.value, Value::String("run".into()));

        let same = compose(&Value::String("run".into()), Some(&first.value), &tag).unwrap();
        assert!(!same.changed);

        let other = compose(&Value::String("stop".into()), Some(&first.value), &tag).unwrap();
        assert!(other.changed);
    }

    #[test]
    fn test_integer_shape_preserved_without_transform() {
        let tag = TagConfig::new("count", "a");
        let out = compose(&Value::Int(7), None, &tag).unwrap();
        assert_eq!(out.value, Value::Int(7));
    }

    #[test]
    fn test_should_persist_gating() {
        let now = Utc::now();
        let changed = TagSample::new(TagId::new("t"), Value::Float(1.0), Value::Float(1.0), true);
        let unchanged =
            TagSample::new(TagId::new("t"), Value::Float(1.0), Value::Float(1.0), false);

        // DAQ disabled: never persisted.
        let tag = TagConfig::new("t", "a");
        assert!(!should_persist(&changed, &tag, None, now));

        // Only-on-change: changed samples pass, unchanged do not (recent write).
        let tag = TagConfig::new("t", "a").with_daq(DaqConfig {
            enabled: true,
            changed: true,
            interval_s: 60,
        });
        assert!(should_persist(&changed, &tag, Some(now), now));
        assert!(!should_persist(&unchanged, &tag, Some(now), now));

        // Unchanged passes once the interval has elapsed.
        let old = now - chrono::Duration::seconds(61);
        assert!(should_persist(&unchanged, &tag, Some(old), now));

        // Never persisted before: unchanged still passes.
        assert!(should_persist(&unchanged, &tag, None, now));

        // Only-on-change off: everything passes.
        let tag = TagConfig::new("t", "a").with_daq(DaqConfig {
            enabled: true,
            changed: false,
            interval_s: 60,
        });
        assert!(should_persist(&unchanged, &tag, Some(now), now));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(50.0244, 1), 50.0);
        assert_eq!(round_to(50.05, 1), 50.1);
        assert_eq!(round_to(-1.2345, 2), -1.23);
        assert_eq!(round_to(3.5, 0), 4.0);
    }
}
