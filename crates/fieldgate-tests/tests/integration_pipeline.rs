//! Pipeline integration tests: scaling, deadband, and history gating
//! running through real adapters rather than in isolation.

use std::sync::Arc;
use std::time::Duration;

use fieldgate_core::driver::NoExternalDependencies;
use fieldgate_core::{
    pipeline, AdapterTiming, DeviceId, DeviceRegistry, DeviceStatus, MemoryHistorySink, TagId,
    Value,
};

use fieldgate_tests::common::builders::{DeviceConfigBuilder, TagConfigBuilder};
use fieldgate_tests::common::fixtures::DeviceFixtures;

fn fast_timing() -> AdapterTiming {
    AdapterTiming {
        retry_period: Duration::from_millis(50),
        disconnect_timeout: Duration::from_millis(200),
    }
}

fn registry(history: Arc<MemoryHistorySink>) -> Arc<DeviceRegistry> {
    let registry = DeviceRegistry::with_options(
        history,
        Arc::new(NoExternalDependencies),
        fast_timing(),
    );
    registry.register_driver(
        fieldgate_core::simulator::PROTOCOL,
        fieldgate_core::simulator::constructor,
    );
    registry
}

// =============================================================================
// End-to-end scaling scenario
// =============================================================================

#[tokio::test]
async fn test_scaled_device_reports_engineering_value() {
    // Raw 2048 in a 0..4095 -> 0..100 window reads as 50.0.
    let history = Arc::new(MemoryHistorySink::default());
    let registry = registry(history);
    registry.load(vec![DeviceFixtures::scaled_simulator("d1")]).await;

    let id = DeviceId::new("d1");
    registry.start(&id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(registry.status(&id), Some(DeviceStatus::Connected));

    let sample = registry.value(&id, &TagId::new("level")).unwrap();
    assert_eq!(sample.value, Value::Float(50.0));
    assert_eq!(sample.raw_value, Value::Float(2048.0));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_deadband_holds_cached_value() {
    // 2048 -> 50.0; a raw step to 2049 scales within the 1.0 deadband, so
    // the cached value stays at 50.0 and changed stays false.
    let tag = TagConfigBuilder::new("level", "static:2048")
        .scale(0.0, 4095.0, 0.0, 100.0)
        .format(1)
        .deadband(1.0)
        .build();
    let device = DeviceConfigBuilder::new("d1", "simulator").tag(tag).build();

    let history = Arc::new(MemoryHistorySink::default());
    let registry = registry(history);
    registry.load(vec![device]).await;

    let id = DeviceId::new("d1");
    registry.start(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(
        registry.value(&id, &TagId::new("level")).unwrap().value,
        Value::Float(50.0)
    );

    // Nudge the raw value by one count through the write path.
    registry
        .write(&id, &TagId::new("level"), Value::Float(50.02))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let sample = registry.value(&id, &TagId::new("level")).unwrap();
    assert!(!sample.changed);
    assert_eq!(sample.value, Value::Float(50.0));

    registry.shutdown().await;
}

// =============================================================================
// History gating
// =============================================================================

#[tokio::test]
async fn test_history_receives_only_changed_samples() {
    let history = Arc::new(MemoryHistorySink::default());
    let registry = registry(history.clone());
    registry.start_history();

    registry.load(vec![DeviceFixtures::scaled_simulator("d1")]).await;
    let id = DeviceId::new("d1");
    registry.start(&id).await.unwrap();

    // Several poll cycles of an unchanging value.
    tokio::time::sleep(Duration::from_millis(600)).await;
    registry.shutdown().await;

    // Only the first (changed) sample passed the only-on-change gate; the
    // 60s DAQ interval re-admits nothing within this test.
    let persisted = history.samples_for(&id, &TagId::new("level"));
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0].changed);
    assert_eq!(persisted[0].value, Value::Float(50.0));
}

#[tokio::test]
async fn test_history_ignores_daq_disabled_tags() {
    let tag = TagConfigBuilder::new("level", "static:1").build();
    let device = DeviceConfigBuilder::new("d1", "simulator").tag(tag).build();

    let history = Arc::new(MemoryHistorySink::default());
    let registry = registry(history.clone());
    registry.start_history();
    registry.load(vec![device]).await;

    let id = DeviceId::new("d1");
    registry.start(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    registry.shutdown().await;

    assert!(history.is_empty());
}

// =============================================================================
// Pipeline properties
// =============================================================================

#[test]
fn test_scaling_roundtrip_within_format_tolerance() {
    for decimals in [0u8, 1, 2, 3] {
        let tag = TagConfigBuilder::new("t", "a")
            .scale(0.0, 4095.0, 0.0, 100.0)
            .format(decimals)
            .build();

        // Rounding to N decimals in engineering units bounds the raw-unit
        // roundtrip error by half a step times the inverse slope.
        let tolerance = 0.5 * 10f64.powi(-(decimals as i32)) * 4095.0 / 100.0 + 1e-9;

        for raw in [0.0, 1.0, 511.5, 2048.0, 4094.0, 4095.0] {
            let composed = pipeline::compose(&Value::Float(raw), None, &tag).unwrap();
            let back = pipeline::decompose(&composed.value, &tag).unwrap();
            let error = (back.as_f64().unwrap() - raw).abs();
            assert!(
                error <= tolerance,
                "decimals={} raw={} error={}",
                decimals,
                raw,
                error
            );
        }
    }
}

#[test]
fn test_deadband_sequence_true_false_true() {
    let tag = TagConfigBuilder::new("t", "a").deadband(0.5).build();

    let a = pipeline::compose(&Value::Float(10.0), None, &tag).unwrap();
    assert!(a.changed);

    let b = pipeline::compose(&Value::Float(10.2), Some(&a.value), &tag).unwrap();
    assert!(!b.changed);

    let c = pipeline::compose(&Value::Float(10.6), Some(&a.value), &tag).unwrap();
    assert!(c.changed);
}
