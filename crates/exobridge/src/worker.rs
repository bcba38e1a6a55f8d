//! # Worker Client
//!
//! The side of the bridge that runs inside a worker thread. Besides the
//! fire-and-forget and async calls it shares with the host, a worker can make
//! **blocking** calls: it posts the request, then parks its whole OS thread on
//! the shared slot until the host publishes an answer. Nothing else on the
//! worker runs while it is parked, including its own inbound pump.
//!
//! Blocking calls need the slot, which arrives with the host's setup envelope.
//! Until the pump has seen that envelope, blocking calls fail with
//! [`Error::NotReady`]; [`WorkerClient::ready`] waits for it.
//!
//! A blocking call whose host listener calls back into this worker and waits
//! for the answer deadlocks: the worker cannot answer while parked.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

use neoslot::SharedSlot;
use neowire::CorrelationId;
use neowire::Envelope;
use neowire::Side;
use neowire::channels;
use neowire::response::decode_response;
use neowire::to_args;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::config::BridgeConfig;
use crate::endpoint::Endpoint;
use crate::endpoint::Routed;
use crate::error::Error;
use crate::error::Result;
use crate::listener::Listener;
use crate::transport::Transport;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LinkState {
    /// Waiting for the setup envelope.
    Pending,
    Ready,
    Closed,
}

/// Handle used by code running on a worker. Cheap to clone.
#[derive(Clone)]
pub struct WorkerClient {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    endpoint: Arc<Endpoint>,
    slot: OnceLock<SharedSlot>,
    /// Held across send, wait and read: the slot answers one call at a time.
    sync_lock: Mutex<()>,
    link: watch::Sender<LinkState>,
    sync_timeout: Option<Duration>,
    strict_sync_ids: bool,
}

impl WorkerClient {
    pub fn new(transport: Arc<dyn Transport>, config: &BridgeConfig) -> Self {
        let (link, _) = watch::channel(LinkState::Pending);
        Self {
            inner: Arc::new(WorkerInner {
                endpoint: Arc::new(Endpoint::new(Side::Worker, transport, config)),
                slot: OnceLock::new(),
                sync_lock: Mutex::new(()),
                link,
                sync_timeout: config.sync_timeout,
                strict_sync_ids: config.strict_sync_ids,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.endpoint.name()
    }

    /// Sends a fire-and-forget message.
    ///
    /// `args` spread into positional arguments (see [`neowire::to_args`]): pass
    /// one argument as `&(x,)`, since a bare sequence spreads and a bare `null`
    /// or `None` sends no arguments at all.
    pub fn call<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<()> {
        self.inner.endpoint.call(channel, args)
    }

    /// Sends a request and waits, without blocking the thread, for its response.
    ///
    /// `args` spread into positional arguments (see [`neowire::to_args`]): pass
    /// one argument as `&(x,)`, since a bare sequence spreads and a bare `null`
    /// or `None` sends no arguments at all.
    pub async fn request<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<Value> {
        self.inner.endpoint.request(channel, args).await
    }

    /// Sends a request and parks the calling thread until the host answers.
    ///
    /// A host with no listener for `channel` answers `null`.
    ///
    /// `args` spread into positional arguments (see [`neowire::to_args`]): pass
    /// one argument as `&(x,)`, since a bare sequence spreads and a bare `null`
    /// or `None` sends no arguments at all.
    pub fn request_sync<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<Value> {
        channels::check_application(channel)?;
        let args = to_args(args)?;
        let slot = self.slot()?;
        let id = self.inner.endpoint.next_id();
        self.block_on_slot(slot, Envelope::sync_request(channel, args, id), id)
    }

    /// Like [`request_sync`](Self::request_sync), but dispatched on the host by
    /// function name through its context handler. `args` spread the same way.
    pub fn request_sync_with_context<A: Serialize + ?Sized>(&self, function: &str, args: &A) -> Result<Value> {
        let args = to_args(args)?;
        let slot = self.slot()?;
        let id = self.inner.endpoint.next_id();
        self.block_on_slot(slot, Envelope::context_request(function, args, id), id)
    }

    /// Registers a listener that runs to completion as its message is pumped.
    pub fn on<F>(&self, channel: &str, f: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.inner.endpoint.on(channel, Listener::sync(f))
    }

    /// Registers a listener whose future may interleave with later messages.
    pub fn on_async<F, Fut>(&self, channel: &str, f: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.inner.endpoint.on(channel, Listener::from_async(f))
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.link.borrow() == LinkState::Ready
    }

    /// Waits for the setup handshake. Fails if the link closed first.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.inner.link.subscribe();
        let state = *rx
            .wait_for(|state| *state != LinkState::Pending)
            .await
            .map_err(|_| Error::ChannelClosed)?;

        match state {
            LinkState::Ready => Ok(()),
            _ => Err(Error::ChannelClosed),
        }
    }

    /// Pumps inbound messages until the host closes the link.
    ///
    /// Must be running for anything to arrive, including the setup handshake.
    pub async fn run(self) -> Result<()> {
        let endpoint = self.inner.endpoint.clone();

        let outcome = loop {
            let packet = match endpoint.recv().await {
                Ok(Some(packet)) => packet,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            let Some(envelope) = endpoint.decode(&packet) else { continue };

            if envelope.channel == channels::SETUP {
                self.accept_setup(packet.transfer);
                continue;
            }

            match endpoint.route(envelope) {
                Routed::Handled => {}
                Routed::Sync { channel, id, .. } => {
                    tracing::warn!(worker = %self.name(), %channel, %id, "workers do not answer blocking requests; dropped");
                }
                Routed::Context { id, call } => {
                    tracing::warn!(worker = %self.name(), function = %call.function, %id, "workers do not answer context requests; dropped");
                }
            }
        };

        tracing::debug!(worker = %self.name(), "worker link closed");
        self.inner.link.send_replace(LinkState::Closed);
        outcome
    }

    fn accept_setup(&self, transfer: Option<SharedSlot>) {
        let Some(slot) = transfer else {
            tracing::warn!(worker = %self.name(), "setup envelope arrived without a slot");
            return;
        };

        if self.inner.slot.set(slot).is_err() {
            tracing::warn!(worker = %self.name(), "duplicate setup envelope ignored");
            return;
        }

        tracing::debug!(worker = %self.name(), "shared slot received");
        self.inner.link.send_replace(LinkState::Ready);
    }

    fn slot(&self) -> Result<&SharedSlot> {
        self.inner.slot.get().ok_or(Error::NotReady)
    }

    fn block_on_slot(&self, slot: &SharedSlot, envelope: Envelope, id: CorrelationId) -> Result<Value> {
        let bytes = envelope.encode()?;

        let _guard = self
            .inner
            .sync_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // snapshot before sending, so an answer that beats us to the wait still counts
        let prior = slot.current_id();
        self.inner.endpoint.send_bytes(bytes)?;
        let received = slot.wait_for_change(prior, self.inner.sync_timeout)?;

        if received != id.0 {
            if self.inner.strict_sync_ids {
                return Err(Error::IdMismatch { expected: id, received });
            }
            tracing::warn!(
                worker = %self.name(),
                expected = %id,
                received,
                "sync response id mismatch; returning slot contents anyway"
            );
        }

        let payload = slot.read_payload()?;
        Ok(decode_response(&payload)?)
    }
}
