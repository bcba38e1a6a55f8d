//! # Transport Abstraction
//!
//! A minimal interface for moving encoded envelopes between a host and a worker.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The transport knows nothing about envelopes or channels.
//!   It moves opaque buffers, plus an optional slot handle riding along the way a
//!   transfer list rides along a posted message.
//! - **Ordered and Reliable**: Packets arrive once, in send order. Nothing above
//!   this layer re-orders or retries.
//! - **Send Never Blocks**: `send` is synchronous so a worker can post a request
//!   and then park its thread without an executor.

use std::sync::Mutex;

use neoslot::SharedSlot;
use tokio::sync::mpsc;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer end was dropped.
    ConnectionLost(String),
    /// This end was closed locally.
    Closed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Closed => write!(f, "Transport closed"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// One message on the wire.
#[derive(Debug)]
pub struct Packet {
    pub bytes: Vec<u8>,
    pub transfer: Option<SharedSlot>,
}

impl Packet {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, transfer: None }
    }

    pub fn with_transfer(bytes: Vec<u8>, slot: SharedSlot) -> Self {
        Self { bytes, transfer: Some(slot) }
    }
}

/// A bidirectional, ordered message pipe.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queues a packet for the peer. Never waits on the peer.
    fn send(&self, packet: Packet) -> Result<()>;

    /// Waits for the next packet. `Ok(None)` once the peer has closed.
    async fn recv(&self) -> Result<Option<Packet>>;

    /// Stops sending. The peer's `recv` drains what was queued, then sees `None`.
    fn close(&self);
}

/// A duplex channel transport using tokio mpsc channels.
///
/// Packets sent on one end appear on the other end's `recv`, in order.
pub struct DuplexTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Packet>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Packet>>,
}

impl DuplexTransport {
    /// Creates a pair of transports connected to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: tokio::sync::Mutex::new(rx_b),
        };

        let b = Self {
            tx: Mutex::new(Some(tx_b)),
            rx: tokio::sync::Mutex::new(rx_a),
        };

        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for DuplexTransport {
    fn send(&self, packet: Packet) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tx = guard.as_ref().ok_or(Error::Closed)?;
        tx.send(packet)
            .map_err(|_| Error::ConnectionLost("Peer dropped its receiver".into()))
    }

    async fn recv(&self) -> Result<Option<Packet>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    fn close(&self) {
        let mut guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take();
    }
}
