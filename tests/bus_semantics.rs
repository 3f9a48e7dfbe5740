//! Data bus delivery semantics

mod common;

use async_trait::async_trait;
use common::Collector;
use packetflow::{BusPayload, BusSubscriber, Content, DataBus, DataPacket, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Subscriber that mutates its own copy of every packet it receives
struct Vandal {
    seen: Mutex<Vec<Content>>,
}

#[async_trait]
impl BusSubscriber for Vandal {
    async fn deliver(&self, payload: BusPayload, _channel: &str) -> Result<()> {
        if let BusPayload::Packet(mut packet) = payload {
            packet.content = Content::Text("vandalized".into());
            self.seen.lock().unwrap().push(packet.content.clone());
        }
        Ok(())
    }
}

/// Subscriber that always fails
struct Faulty;

#[async_trait]
impl BusSubscriber for Faulty {
    async fn deliver(&self, _payload: BusPayload, _channel: &str) -> Result<()> {
        Err(packetflow::Error::NodeExecution("subscriber exploded".into()))
    }
}

fn packet(i: i64) -> DataPacket {
    DataPacket::builder(Content::Integer(i)).build()
}

/// Two subscribers of one channel each see publishes in publish order
#[tokio::test(flavor = "multi_thread")]
async fn test_per_channel_fifo_across_subscribers() {
    let bus = DataBus::with_workers(8);
    let first = Collector::new();
    let second = Collector::new();
    bus.subscribe("seq_out", first.clone());
    bus.subscribe("seq_out", second.clone());

    for i in 0..50 {
        bus.publish("seq_out", packet(i));
    }
    sleep(Duration::from_millis(300)).await;

    for collector in [&first, &second] {
        let numbers = collector.numbers();
        let expected: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert_eq!(numbers, expected);
    }
    bus.shutdown().await;
}

/// One subscriber mutating its copy never affects what a peer sees
#[tokio::test(flavor = "multi_thread")]
async fn test_mutation_isolation() {
    let bus = DataBus::with_workers(4);
    let vandal = Arc::new(Vandal {
        seen: Mutex::new(Vec::new()),
    });
    let witness = Collector::new();
    bus.subscribe("shared_out", vandal.clone());
    bus.subscribe("shared_out", witness.clone());

    for i in 0..10 {
        bus.publish("shared_out", packet(i));
    }
    sleep(Duration::from_millis(200)).await;

    assert_eq!(vandal.seen.lock().unwrap().len(), 10);
    let numbers = witness.numbers();
    let expected: Vec<f64> = (0..10).map(|i| i as f64).collect();
    assert_eq!(numbers, expected, "witness saw vandalized packets");
    bus.shutdown().await;
}

/// A failing subscriber does not abort delivery to the others
#[tokio::test(flavor = "multi_thread")]
async fn test_subscriber_failure_isolated() {
    let bus = DataBus::with_workers(4);
    let witness = Collector::new();
    bus.subscribe("ch_out", Arc::new(Faulty));
    bus.subscribe("ch_out", witness.clone());

    for i in 0..5 {
        bus.publish("ch_out", packet(i));
    }
    sleep(Duration::from_millis(200)).await;

    assert_eq!(witness.len(), 5);
    bus.shutdown().await;
}

/// Publishing to a channel with no subscribers schedules nothing
#[tokio::test(flavor = "multi_thread")]
async fn test_no_subscribers_no_delivery() {
    let bus = DataBus::with_workers(2);
    bus.register_channel("silent_out");
    bus.publish("silent_out", packet(1));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(bus.channel_stats()["silent_out"], 0);
    bus.shutdown().await;
}

/// Flush clears every channel and subscription
#[tokio::test(flavor = "multi_thread")]
async fn test_flush_clears_subscriptions() {
    let bus = DataBus::with_workers(2);
    let witness = Collector::new();
    bus.subscribe("ch_out", witness.clone());

    bus.flush();
    bus.publish("ch_out", packet(1));
    sleep(Duration::from_millis(50)).await;

    assert_eq!(witness.len(), 0);
    assert!(bus.channel_stats().is_empty());
    bus.shutdown().await;
}

/// Payload survives the codec boundary bit-for-bit
#[tokio::test(flavor = "multi_thread")]
async fn test_round_trip_identity() {
    let bus = DataBus::with_workers(2);
    let witness = Collector::new();
    bus.subscribe("rt_out", witness.clone());

    let original = DataPacket::builder(Content::Map(
        [
            ("reading".to_string(), Content::Float(21.5)),
            ("raw".to_string(), Content::Bytes(vec![1, 2, 3])),
        ]
        .into_iter()
        .collect(),
    ))
    .sequence_id(42)
    .touched_by("sensor_0a1b2c3d")
    .build();

    bus.publish("rt_out", original.clone());
    sleep(Duration::from_millis(100)).await;

    let received = witness.packets();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], original);
    bus.shutdown().await;
}
