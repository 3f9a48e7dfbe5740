//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use packetflow::{BusPayload, BusSubscriber, Content, DataPacket, Result};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Bus subscriber that records every packet it receives, with arrival time
pub struct Collector {
    seen: Mutex<Vec<(DataPacket, DateTime<Utc>)>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn packets(&self) -> Vec<DataPacket> {
        self.seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn contents(&self) -> Vec<Content> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.content.clone())
            .collect()
    }

    /// Numeric contents, in arrival order
    pub fn numbers(&self) -> Vec<f64> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(p, _)| p.content.as_f64())
            .collect()
    }

    /// Arrival instants, in delivery order
    pub fn arrivals(&self) -> Vec<DateTime<Utc>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, arrived)| *arrived)
            .collect()
    }
}

#[async_trait]
impl BusSubscriber for Collector {
    async fn deliver(&self, payload: BusPayload, _channel: &str) -> Result<()> {
        if let BusPayload::Packet(packet) = payload {
            self.seen.lock().unwrap().push((packet, Utc::now()));
        }
        Ok(())
    }
}

/// Poll until the collector holds at least `count` packets or `deadline`
/// elapses
pub async fn wait_for_packets(collector: &Collector, count: usize, deadline: Duration) {
    let started = std::time::Instant::now();
    while collector.len() < count && started.elapsed() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
