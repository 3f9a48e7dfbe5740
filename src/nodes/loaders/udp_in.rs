//! UDP datagram listener
//!
//! Async-capable: `start` binds the socket and spawns a listener task
//! that publishes one EVENT packet per datagram. The frame loop never
//! calls `process` on this node; shutdown cancels the listener through a
//! watch channel.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::data::{DataFormat, DataType};
use crate::node::{parse_params, ConfiguredNode, Emitter, NodeContext, NodeHandler, NodeProfile};
use crate::{Content, Error, Result};

/// Bound on waiting for the listener task during `stop`
const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct UdpInParams {
    /// Interface to bind
    pub host: String,
    /// UDP port to listen on
    pub port: u16,
}

impl Default for UdpInParams {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

/// Publishes inbound UDP datagrams as TEXTUAL EVENT packets
pub struct UdpInNode {
    params: UdpInParams,
    stop_tx: Option<watch::Sender<bool>>,
    listener: Option<tokio::task::JoinHandle<()>>,
}

impl UdpInNode {
    async fn listen(
        socket: UdpSocket,
        emitter: Emitter,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            error!(node = %emitter.node_name(), error = %e, "udp receive failed");
                            continue;
                        }
                    };
                    let content = match std::str::from_utf8(&buf[..len]) {
                        Ok(text) => Content::Text(text.to_string()),
                        Err(_) => Content::Bytes(buf[..len].to_vec()),
                    };
                    let format = match content {
                        Content::Text(_) => DataFormat::Textual,
                        _ => DataFormat::Binary,
                    };
                    debug!(node = %emitter.node_name(), %peer, bytes = len, "datagram received");
                    let packet = emitter
                        .create_packet(content)
                        .data_type(DataType::Event)
                        .format(format)
                        .build();
                    emitter.publish(&packet);
                }
            }
        }
        debug!(node = %emitter.node_name(), "udp listener exited");
    }
}

#[async_trait]
impl NodeHandler for UdpInNode {
    async fn start(&mut self, ctx: &mut NodeContext) -> Result<()> {
        let addr = format!("{}:{}", self.params.host, self.params.port);
        let socket = UdpSocket::bind(&addr).await.map_err(|e| {
            Error::NodeExecution(format!("failed to bind udp socket {addr}: {e}"))
        })?;
        info!(node = %ctx.node_name(), %addr, "udp listener bound");

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.listener = Some(tokio::spawn(Self::listen(socket, ctx.emitter(), stop_rx)));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(listener) = self.listener.take() {
            let _ = tokio::time::timeout(LISTENER_JOIN_TIMEOUT, listener).await;
        }
        Ok(())
    }

    fn apply_params(&mut self, params: &serde_json::Value) -> Result<()> {
        // Rebinding happens on the next start; the live socket keeps its
        // address
        self.params = parse_params(params)?;
        Ok(())
    }
}

impl ConfiguredNode for UdpInNode {
    type Params = UdpInParams;

    fn from_params(params: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            params: parse_params(params)?,
            stop_tx: None,
            listener: None,
        })
    }

    fn profile() -> NodeProfile {
        NodeProfile::generator().async_capable()
    }
}

crate::register_node!("udp_in", UdpInNode);
