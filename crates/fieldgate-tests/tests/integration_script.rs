//! ScriptLink driver integration tests against a mock controller speaking
//! the full protocol: framed transport, script-state payloads (plain and
//! zlib-compressed), write acknowledgements, and browsing.

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use fieldgate_config::{DeviceConfig, ScaleConfig, TagConfig};
use fieldgate_core::driver::DeviceDriver;
use fieldgate_core::{TagId, Value};
use fieldgate_scriptlink::types::service;
use fieldgate_scriptlink::{Frame, FrameDecoder, ScriptLinkConfig, ScriptLinkDriver};

// =============================================================================
// Mock controller
// =============================================================================

struct MockController {
    addr: SocketAddr,
    /// Write scripts received by the controller.
    writes: mpsc::UnboundedReceiver<String>,
}

/// Serves the ScriptLink protocol for one connection: a greeting line,
/// `state_script` for every state request, and positive acknowledgements
/// for writes.
async fn spawn_controller(state_script: &'static str, compress: bool) -> MockController {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (writes_tx, writes_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"SCRIPTLINK v2.4 ready\n").await.unwrap();

        let mut decoder = FrameDecoder::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            decoder.extend(&chunk[..n]);
            while let Ok(Some(frame)) = decoder.try_decode() {
                let response = match frame.service {
                    service::STATE_REQUEST => {
                        let payload = if compress {
                            let mut encoder = flate2::write::ZlibEncoder::new(
                                Vec::new(),
                                flate2::Compression::default(),
                            );
                            encoder.write_all(state_script.as_bytes()).unwrap();
                            encoder.finish().unwrap()
                        } else {
                            state_script.as_bytes().to_vec()
                        };
                        Frame::new(service::STATE_RESPONSE, frame.sequence, payload)
                    }
                    service::WRITE_REQUEST => {
                        let script = String::from_utf8_lossy(&frame.payload).into_owned();
                        let _ = writes_tx.send(script);
                        Frame::new(service::WRITE_ACK, frame.sequence, vec![0x01])
                    }
                    other => Frame::new(other | 0x80, frame.sequence, Vec::new()),
                };
                if socket.write_all(&response.encode()).await.is_err() {
                    return;
                }
            }
        }
    });

    MockController {
        addr,
        writes: writes_rx,
    }
}

const STATE_SCRIPT: &str = r#"
    Device = #{
        drive: #{ speed: 1450, setpoint: 1500.0, running: true },
        tanks: [ #{ level: 2048 }, #{ level: 512 } ],
        label: "mixer-7"
    };
"#;

fn device(addr: SocketAddr, tags: Vec<TagConfig>) -> Arc<DeviceConfig> {
    Arc::new(DeviceConfig {
        id: "ctl-1".to_string(),
        name: "Controller 1".to_string(),
        protocol: "scriptlink".to_string(),
        enabled: true,
        polling_ms: 1000,
        timeout_ms: 2000,
        property: serde_json::json!({
            "host": "127.0.0.1",
            "port": addr.port(),
            "expect_greeting": true
        }),
        tags: tags.into_iter().map(|t| (t.id.clone(), t)).collect(),
    })
}

async fn connected_driver(addr: SocketAddr, tags: Vec<TagConfig>) -> ScriptLinkDriver {
    let device = device(addr, tags);
    let config = ScriptLinkConfig::from_property(&device.id, &device.property).unwrap();
    let mut driver = ScriptLinkDriver::new(device, config);
    driver.connect().await.unwrap();
    driver
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_poll_extracts_state_through_pipeline() {
    let controller = spawn_controller(STATE_SCRIPT, false).await;

    let tags = vec![
        TagConfig::new("speed", "Device.drive.speed"),
        TagConfig::new("running", "Device.drive.running"),
        TagConfig::new("label", "Device.label"),
        // Tank level scaled from a 12-bit register to percent.
        TagConfig::new("tank0", "Device.tanks[0].level")
            .with_scale(ScaleConfig::new(0.0, 4095.0, 0.0, 100.0))
            .with_format(1),
    ];
    let mut driver = connected_driver(controller.addr, tags).await;

    let outcome = driver.poll().await.unwrap();
    assert_eq!(outcome.samples.len(), 4);

    assert_eq!(
        outcome.samples[&TagId::new("speed")].value,
        Value::Int(1450)
    );
    assert_eq!(
        outcome.samples[&TagId::new("running")].value,
        Value::Bool(true)
    );
    assert_eq!(
        outcome.samples[&TagId::new("label")].value,
        Value::String("mixer-7".into())
    );
    assert_eq!(
        outcome.samples[&TagId::new("tank0")].value,
        Value::Float(50.0)
    );
    // Raw value preserved alongside the engineering value.
    assert_eq!(
        outcome.samples[&TagId::new("tank0")].raw_value,
        Value::Int(2048)
    );

    driver.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_poll_with_compressed_payload() {
    let controller = spawn_controller(STATE_SCRIPT, true).await;
    let mut driver = connected_driver(
        controller.addr,
        vec![TagConfig::new("speed", "Device.drive.speed")],
    )
    .await;

    let outcome = driver.poll().await.unwrap();
    assert_eq!(
        outcome.samples[&TagId::new("speed")].value,
        Value::Int(1450)
    );
}

#[tokio::test]
async fn test_unpopulated_branch_reads_null() {
    let controller = spawn_controller(STATE_SCRIPT, false).await;
    let mut driver = connected_driver(
        controller.addr,
        vec![
            TagConfig::new("speed", "Device.drive.speed"),
            TagConfig::new("ghost", "Device.optional.sensor"),
        ],
    )
    .await;

    let outcome = driver.poll().await.unwrap();
    // The missing branch is isolated: its tag reads null, the rest lives.
    assert!(outcome.samples[&TagId::new("ghost")].value.is_null());
    assert_eq!(
        outcome.samples[&TagId::new("speed")].value,
        Value::Int(1450)
    );
}

#[tokio::test]
async fn test_unchanged_poll_marks_no_changes() {
    let controller = spawn_controller(STATE_SCRIPT, false).await;
    let mut driver = connected_driver(
        controller.addr,
        vec![TagConfig::new("speed", "Device.drive.speed")],
    )
    .await;

    let first = driver.poll().await.unwrap();
    assert!(first.samples[&TagId::new("speed")].changed);

    let second = driver.poll().await.unwrap();
    assert!(!second.samples[&TagId::new("speed")].changed);
    assert!(!second.has_changes());
}

#[tokio::test]
async fn test_write_renders_inverse_transform_script() {
    let mut controller = spawn_controller(STATE_SCRIPT, false).await;

    let tag = TagConfig::new("tank0", "Device.tanks[0].level")
        .with_scale(ScaleConfig::new(0.0, 4095.0, 0.0, 100.0));
    let mut driver = connected_driver(controller.addr, vec![tag]).await;

    let acked = driver
        .write(&TagId::new("tank0"), Value::Float(50.0))
        .await
        .unwrap();
    assert!(acked);

    // The controller received the raw (decomposed) value addressed by the
    // bracketed path form.
    let script = controller.writes.recv().await.unwrap();
    assert_eq!(script, "Device.tanks[0].level = 2047.5;");
}

#[tokio::test]
async fn test_browse_walks_last_state() {
    let controller = spawn_controller(STATE_SCRIPT, false).await;
    let mut driver = connected_driver(
        controller.addr,
        vec![TagConfig::new("speed", "Device.drive.speed")],
    )
    .await;

    // Browse is backed by the last poll's state tree.
    assert!(driver.browse(None).await.is_err());
    driver.poll().await.unwrap();

    let roots = driver.browse(None).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, "Device");
    assert!(roots[0].container);

    let children = driver.browse(Some("Device.drive")).await.unwrap();
    let ids: Vec<&str> = children.iter().map(|n| n.id.as_str()).collect();
    assert!(ids.contains(&"Device.drive.speed"));
    assert!(ids.contains(&"Device.drive.running"));
    assert!(children.iter().all(|n| !n.container));
}

#[tokio::test]
async fn test_disconnect_clears_session_state() {
    let controller = spawn_controller(STATE_SCRIPT, false).await;
    let mut driver = connected_driver(
        controller.addr,
        vec![TagConfig::new("speed", "Device.drive.speed")],
    )
    .await;

    driver.poll().await.unwrap();
    driver.disconnect().await.unwrap();

    assert!(!driver.is_connected());
    // The interpreter went with the connection; polling now refuses.
    assert!(driver.poll().await.is_err());
    // And browse no longer has a state tree to serve.
    assert!(driver.browse(None).await.is_err());
}

#[tokio::test]
async fn test_malformed_script_keeps_partial_state() {
    // The script populates half the state, then dies on a missing method.
    let controller = spawn_controller(
        r#"
        Device = #{ drive: #{ speed: 900 } };
        Device.extras.calibrate();
        "#,
        false,
    )
    .await;

    let mut driver = connected_driver(
        controller.addr,
        vec![TagConfig::new("speed", "Device.drive.speed")],
    )
    .await;

    let outcome = driver.poll().await.unwrap();
    assert_eq!(outcome.samples[&TagId::new("speed")].value, Value::Int(900));
}
