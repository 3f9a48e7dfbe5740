//! End-to-end pipeline scenarios

mod common;

use common::{wait_for_packets, Collector};
use packetflow::config::PipelineConfig;
use packetflow::{Content, Error, Pipeline};
use serde_json::json;
use std::time::Duration;

fn config(value: serde_json::Value) -> PipelineConfig {
    PipelineConfig::from_value(value).expect("valid config")
}

/// number_generator -> math_multiply -> console_logger at a fixed frame
/// rate produces the multiplied sequence in order
#[tokio::test(flavor = "multi_thread")]
async fn test_generator_multiply_chain() {
    let pipeline = Pipeline::new(
        "scenario-multiply",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "number_generator", "name": "numbers", "params": { "start": 0, "step": 1 } },
                { "type": "math_multiply", "name": "triple", "inputs": ["numbers"], "params": { "multiplier": 3 } },
                { "type": "console_logger", "name": "log", "inputs": ["triple"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("triple_out", collector.clone());

    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 5, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    let numbers = collector.numbers();
    assert!(numbers.len() >= 5, "expected at least 5 packets, got {numbers:?}");
    assert_eq!(&numbers[..5], &[0.0, 3.0, 6.0, 9.0, 12.0]);
}

/// timer -> random_number -> console_logger paces emissions by wall time
#[tokio::test(flavor = "multi_thread")]
async fn test_timer_random_chain() {
    let pipeline = Pipeline::new(
        "scenario-random",
        config(json!({
            "settings": { "fps_limit": 200 },
            "nodes": [
                { "type": "timer", "name": "tick", "params": { "interval": 0.05 } },
                { "type": "random_number", "name": "rand", "inputs": ["tick"], "params": { "min_value": 0, "max_value": 10 } },
                { "type": "console_logger", "name": "log", "inputs": ["rand"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("rand_out", collector.clone());

    pipeline.run().await.unwrap();
    tokio::time::sleep(Duration::from_millis(310)).await;
    pipeline.shutdown().await;

    let numbers = collector.numbers();
    assert!(
        (5..=7).contains(&numbers.len()),
        "expected 5 to 7 packets at one per 50ms over 300ms, got {}",
        numbers.len()
    );
    for value in &numbers {
        assert!((0.0..=10.0).contains(value), "value {value} out of range");
    }
}

/// A countdown joined with a constant through math_add yields the
/// descending sums
#[tokio::test(flavor = "multi_thread")]
async fn test_countdown_join() {
    let pipeline = Pipeline::new(
        "scenario-join",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "number_generator", "name": "countdown", "params": { "start": 10, "step": -1 } },
                { "type": "constant", "name": "base", "params": { "value": 100 } },
                { "type": "math_add", "name": "sum", "inputs": ["countdown", "base"] },
                { "type": "console_logger", "name": "log", "inputs": ["sum"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("sum_out", collector.clone());

    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 11, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    let numbers = collector.numbers();
    assert!(numbers.len() >= 11, "expected 11 sums, got {numbers:?}");
    let expected: Vec<f64> = (0..11).map(|i| 110.0 - i as f64).collect();
    assert_eq!(&numbers[..11], &expected[..]);
}

/// The delay node forwards packets roughly delay_ms after their creation
#[tokio::test(flavor = "multi_thread")]
async fn test_delay_timing() {
    let pipeline = Pipeline::new(
        "scenario-delay",
        config(json!({
            "settings": { "fps_limit": 100 },
            "nodes": [
                { "type": "number_generator", "name": "src", "params": { "start": 1, "step": 1 } },
                { "type": "delay", "name": "hold", "inputs": ["src"], "params": { "delay_ms": 200 } },
                { "type": "console_logger", "name": "log", "inputs": ["hold"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("hold_out", collector.clone());

    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 3, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    let packets = collector.packets();
    let arrivals = collector.arrivals();
    assert!(packets.len() >= 3, "expected 3 delayed packets, got {}", packets.len());

    // Sources publish 10ms apart at 100fps; each packet must land in its
    // own 200/210/220 (+-20ms) window relative to the first emission
    let base = packets[0].timestamp;
    for (i, arrived) in arrivals.iter().take(3).enumerate() {
        let offset = (*arrived - base).num_milliseconds();
        let expected = 200 + 10 * i as i64;
        assert!(
            (expected - 20..=expected + 20).contains(&offset),
            "packet {i} arrived {offset}ms after the first emission, expected {expected}±20ms"
        );
    }
    // Forwarded unchanged: the sequence survives the delay in order
    let numbers = collector.numbers();
    assert_eq!(&numbers[..3], &[1.0, 2.0, 3.0]);
}

/// Duplicate node names fail the build atomically
#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_name_fails_build() {
    let pipeline = Pipeline::new(
        "scenario-duplicate",
        PipelineConfig {
            nodes: vec![
                packetflow::NodeSpec {
                    node_type: "timer".into(),
                    name: "x".into(),
                    ..Default::default()
                },
                packetflow::NodeSpec {
                    node_type: "timer".into(),
                    name: "x".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        },
    );

    let err = pipeline.build().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
    assert!(pipeline.nodes().await.is_empty(), "no partial graph retained");
}

/// An invalid live parameter update is rejected and the node keeps its
/// prior behavior
#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_param_update_rejected() {
    let pipeline = Pipeline::new(
        "scenario-param-update",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "number_generator", "name": "numbers", "params": { "start": 0, "step": 1 } },
                { "type": "math_multiply", "name": "triple", "inputs": ["numbers"], "params": { "multiplier": 3 } },
                { "type": "console_logger", "name": "log", "inputs": ["triple"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("triple_out", collector.clone());
    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 3, Duration::from_secs(3)).await;

    let result = pipeline
        .update_node_params("triple", json!({ "multiplier": "not-a-number" }))
        .await;
    assert!(matches!(result, Err(Error::InvalidParams { .. })), "got {result:?}");

    let node = pipeline.node("triple").await.unwrap();
    assert_eq!(node.params().await["multiplier"], json!(3));

    let before = collector.len();
    wait_for_packets(&collector, before + 3, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    // Everything emitted after the rejected update is still a multiple of
    // three of the consecutive generator sequence
    let numbers = collector.numbers();
    for (i, value) in numbers.iter().enumerate() {
        assert_eq!(*value, (i as f64) * 3.0, "sequence diverged at {i}: {numbers:?}");
    }
}

/// A parameter bound with @ref: tracks the upstream node's content
#[tokio::test(flavor = "multi_thread")]
async fn test_reference_bound_parameter() {
    let pipeline = Pipeline::new(
        "scenario-reference",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "number_generator", "name": "ctrl", "params": { "start": 2, "step": 0 } },
                { "type": "number_generator", "name": "src", "params": { "start": 1, "step": 1 } },
                { "type": "math_multiply", "name": "scale", "inputs": ["src"],
                  "params": { "multiplier": "@ref:ctrl.content" } },
                { "type": "console_logger", "name": "log", "inputs": ["scale"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("scale_out", collector.clone());

    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 6, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    // The bound multiplier equals the value walked out of ctrl's packet
    let scale = pipeline.node("scale").await.unwrap();
    assert_eq!(scale.params().await["multiplier"], json!(2));

    // Once bound, outputs are doubled source values: consecutive evens
    let numbers = collector.numbers();
    let tail = &numbers[numbers.len() - 3..];
    for pair in tail.windows(2) {
        assert_eq!(pair[1] - pair[0], 2.0, "tail not doubled: {numbers:?}");
    }
    assert_eq!(tail[0] % 2.0, 0.0);
}

/// A reference whose value cannot coerce leaves the prior parameter in
/// force
#[tokio::test(flavor = "multi_thread")]
async fn test_reference_coercion_failure_keeps_prior() {
    let pipeline = Pipeline::new(
        "scenario-bad-reference",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "constant", "name": "ctrl", "params": { "value": "not numeric" } },
                { "type": "number_generator", "name": "src", "params": { "start": 1, "step": 1 } },
                { "type": "math_multiply", "name": "scale", "inputs": ["src"],
                  "params": { "multiplier": "@ref:ctrl.content" } },
                { "type": "console_logger", "name": "log", "inputs": ["scale"] }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("scale_out", collector.clone());

    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 4, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    // Coercion failed, so the multiplier stays at its default of 1 and the
    // source sequence passes through unscaled
    let numbers = collector.numbers();
    assert!(numbers.len() >= 4);
    assert_eq!(&numbers[..4], &[1.0, 2.0, 3.0, 4.0]);
}

/// Rejected packets: a node whose accept sets exclude the inbound triple
/// drops it and counts the rejection
#[tokio::test(flavor = "multi_thread")]
async fn test_validation_rejects_wrong_kind() {
    let pipeline = Pipeline::new(
        "scenario-validation",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "timer", "name": "tick", "params": { "interval": 0.02 } },
                { "type": "math_multiply", "name": "scale", "inputs": ["tick"], "params": { "multiplier": 2 } }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("scale_out", collector.clone());

    pipeline.run().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    pipeline.shutdown().await;

    // Timer emits EVENT packets; math_multiply accepts STREAM/DERIVED only
    let scale = pipeline.node("scale").await.unwrap();
    assert!(scale.rejected_count() > 0, "expected rejections");
    assert_eq!(collector.len(), 0, "rejected packets must not be processed");
}

/// Every emitted packet records each producing node in its processing
/// chain exactly once
#[tokio::test(flavor = "multi_thread")]
async fn test_processing_chain_appended_once() {
    let pipeline = Pipeline::new(
        "scenario-chain",
        config(json!({
            "settings": { "fps_limit": 60 },
            "nodes": [
                { "type": "number_generator", "name": "numbers", "params": { "start": 0, "step": 1 } },
                { "type": "math_multiply", "name": "triple", "inputs": ["numbers"], "params": { "multiplier": 3 } }
            ]
        })),
    );
    pipeline.build().await.unwrap();

    let collector = Collector::new();
    pipeline.bus().await.subscribe("triple_out", collector.clone());
    pipeline.run().await.unwrap();
    wait_for_packets(&collector, 3, Duration::from_secs(3)).await;
    pipeline.shutdown().await;

    let gen_id = pipeline.node("numbers").await.unwrap().node_id().to_string();
    let triple_id = pipeline.node("triple").await.unwrap().node_id().to_string();

    for packet in collector.packets().iter().take(3) {
        let gen_hits = packet.processing_chain.iter().filter(|id| **id == gen_id).count();
        let triple_hits = packet
            .processing_chain
            .iter()
            .filter(|id| **id == triple_id)
            .count();
        assert_eq!(gen_hits, 1, "chain: {:?}", packet.processing_chain);
        assert_eq!(triple_hits, 1, "chain: {:?}", packet.processing_chain);
    }

    let first = &collector.packets()[0];
    assert_eq!(first.content, Content::Float(0.0));
}
