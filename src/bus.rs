//! Datagram message bus abstraction and UDP implementation
//!
//! The datagram transport never touches a socket itself; it subscribes an
//! [`InboundHandler`] on a [`MessageBus`] and sends frames through it. The
//! UDP implementation binds a tokio socket and runs one receive task that
//! feeds every datagram to the handler.

use std::future::Future;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::constants::RESPONSE_BUFFER_SIZE;
use crate::error::{ModbusError, ModbusResult};

/// Callback invoked for every inbound datagram payload
pub trait InboundHandler: Send + Sync + 'static {
    fn handle(&self, payload: &[u8]);
}

/// Datagram message bus
pub trait MessageBus: Send + Sync {
    /// Bind a local endpoint and deliver every inbound payload to `handler`
    fn subscribe(
        &self,
        bind_host: &str,
        port: u16,
        handler: Arc<dyn InboundHandler>,
    ) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Send a payload to a remote endpoint
    fn send(
        &self,
        host: &str,
        port: u16,
        payload: &[u8],
    ) -> impl Future<Output = ModbusResult<()>> + Send;
}

struct UdpSubscription {
    socket: Arc<UdpSocket>,
    recv_task: JoinHandle<()>,
}

/// Message bus over a tokio UDP socket
///
/// `subscribe` may be called at most once; `send` reuses the subscribed
/// socket when present and otherwise binds an ephemeral one per call.
pub struct UdpMessageBus {
    subscription: Mutex<Option<UdpSubscription>>,
}

impl UdpMessageBus {
    pub fn new() -> Self {
        Self {
            subscription: Mutex::new(None),
        }
    }
}

impl Default for UdpMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for UdpMessageBus {
    async fn subscribe(
        &self,
        bind_host: &str,
        port: u16,
        handler: Arc<dyn InboundHandler>,
    ) -> ModbusResult<()> {
        let host = if bind_host.is_empty() {
            "0.0.0.0"
        } else {
            bind_host
        };
        let addr = format!("{host}:{port}");
        let socket = UdpSocket::bind(addr.as_str())
            .await
            .map_err(|e| ModbusError::transport_open(format!("bind {addr}: {e}")))?;
        let socket = Arc::new(socket);
        debug!(%addr, "udp bus subscribed");

        let recv_socket = Arc::clone(&socket);
        let recv_task = tokio::spawn(async move {
            let mut buf = [0u8; RESPONSE_BUFFER_SIZE];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, peer)) => {
                        trace!(bytes = len, %peer, "udp datagram received");
                        handler.handle(&buf[..len]);
                    }
                    Err(e) => {
                        warn!(error = %e, "udp receive failed, stopping bus task");
                        break;
                    }
                }
            }
        });

        let mut slot = self.subscription.lock().await;
        if let Some(previous) = slot.replace(UdpSubscription { socket, recv_task }) {
            previous.recv_task.abort();
        }
        Ok(())
    }

    async fn send(&self, host: &str, port: u16, payload: &[u8]) -> ModbusResult<()> {
        let addr = format!("{host}:{port}");
        let slot = self.subscription.lock().await;
        let sent = match slot.as_ref() {
            Some(sub) => sub
                .socket
                .send_to(payload, addr.as_str())
                .await
                .map_err(|e| ModbusError::write(format!("udp send to {addr}: {e}")))?,
            None => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(|e| ModbusError::write(format!("udp bind for send: {e}")))?;
                socket
                    .send_to(payload, addr.as_str())
                    .await
                    .map_err(|e| ModbusError::write(format!("udp send to {addr}: {e}")))?
            }
        };
        if sent != payload.len() {
            return Err(ModbusError::write(format!(
                "udp short send: {sent} of {} bytes",
                payload.len()
            )));
        }
        trace!(bytes = sent, %addr, "udp datagram sent");
        Ok(())
    }
}

impl Drop for UdpMessageBus {
    fn drop(&mut self) {
        if let Ok(slot) = self.subscription.try_lock() {
            if let Some(sub) = slot.as_ref() {
                sub.recv_task.abort();
            }
        }
    }
}
