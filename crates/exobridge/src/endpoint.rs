//! # Endpoint
//!
//! The half of the protocol both sides share. A host handle and a worker
//! client each own one endpoint and differ only in what they do with blocking
//! requests and the setup handshake.
//!
//! Inbound routing, per envelope:
//!
//! - no id: fire-and-forget, dispatched to the channel's listener.
//! - an id this side allocated: the answer to one of our requests.
//! - an id the peer allocated, no sync flag: an async request; the listener's
//!   result goes back as `[channel, result, id]`.
//! - sync flag: handed back to the owning side via [`Routed`].

use std::sync::Arc;
use std::time::Duration;

use neowire::CorrelationId;
use neowire::Envelope;
use neowire::IdAllocator;
use neowire::Kind;
use neowire::Side;
use neowire::channels;
use neowire::to_args;
use serde::Serialize;
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::context::ContextCall;
use crate::error::Error;
use crate::error::Result;
use crate::listener::Listener;
use crate::listener::ListenerRegistry;
use crate::listener::drive;
use crate::pending::PendingTable;
use crate::transport::Packet;
use crate::transport::Transport;

/// What the side-specific pump still has to deal with after routing.
pub(crate) enum Routed {
    Handled,
    Sync { channel: String, args: Vec<Value>, id: CorrelationId },
    Context { id: CorrelationId, call: ContextCall },
}

pub(crate) struct Endpoint {
    name: String,
    transport: Arc<dyn Transport>,
    ids: IdAllocator,
    pending: PendingTable,
    pub(crate) listeners: ListenerRegistry,
    request_timeout: Option<Duration>,
}

impl Endpoint {
    pub(crate) fn new(side: Side, transport: Arc<dyn Transport>, config: &BridgeConfig) -> Self {
        Self {
            name: config.name.clone(),
            transport,
            ids: IdAllocator::new(side),
            pending: PendingTable::new(),
            listeners: ListenerRegistry::new(),
            request_timeout: config.request_timeout,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn side(&self) -> Side {
        self.ids.side()
    }

    pub(crate) fn next_id(&self) -> CorrelationId {
        self.ids.next()
    }

    pub(crate) fn send(&self, envelope: &Envelope) -> Result<()> {
        self.send_bytes(envelope.encode()?)
    }

    pub(crate) fn send_bytes(&self, bytes: Vec<u8>) -> Result<()> {
        self.transport.send(Packet::new(bytes))?;
        Ok(())
    }

    pub(crate) async fn recv(&self) -> Result<Option<Packet>> {
        Ok(self.transport.recv().await?)
    }

    pub(crate) fn close(&self) {
        self.transport.close();
    }

    pub(crate) fn on(&self, channel: &str, listener: Listener) -> Result<()> {
        channels::check_application(channel)?;
        self.listeners.register(channel, listener);
        Ok(())
    }

    /// Fire-and-forget.
    pub(crate) fn call<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<()> {
        channels::check_application(channel)?;
        let args = to_args(args)?;
        self.send(&Envelope::event(channel, args))
    }

    /// Async round trip, correlated through the pending table.
    pub(crate) async fn request<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<Value> {
        channels::check_application(channel)?;
        let args = to_args(args)?;

        let id = self.next_id();
        let rx = self.pending.register(id);
        // also covers the caller dropping this future mid-wait
        let _entry = self.pending.guard(id);

        self.send(&Envelope::request(channel, args, id))?;

        let outcome = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx).await.map_err(|_| Error::Timeout)?,
            None => rx.await,
        };

        outcome.map_err(|_| Error::ChannelClosed)
    }

    /// Decodes one packet. Undecodable packets are logged and skipped.
    pub(crate) fn decode(&self, packet: &Packet) -> Option<Envelope> {
        match Envelope::decode(&packet.bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(worker = %self.name, side = %self.side(), error = %e, "dropping undecodable envelope");
                None
            }
        }
    }

    /// Handles everything that needs no side-specific knowledge.
    pub(crate) fn route(self: &Arc<Self>, envelope: Envelope) -> Routed {
        let kind = envelope.kind();
        tracing::trace!(worker = %self.name, side = %self.side(), channel = %envelope.channel, ?kind, "routing envelope");

        match kind {
            Kind::Event => {
                let channel = envelope.channel.clone();
                self.handle_event(&channel, envelope.into_args());
                Routed::Handled
            }
            Kind::Request(id) if self.ids.owns(id) => {
                self.accept_response(id, envelope.payload);
                Routed::Handled
            }
            Kind::Request(id) => {
                let channel = envelope.channel.clone();
                self.handle_request(channel, envelope.into_args(), id);
                Routed::Handled
            }
            Kind::SyncRequest(id) => {
                let channel = envelope.channel.clone();
                Routed::Sync { channel, args: envelope.into_args(), id }
            }
            Kind::ContextRequest { id, function } => {
                Routed::Context { id, call: ContextCall::new(function, envelope.into_args()) }
            }
        }
    }

    /// Completes one of our own requests.
    fn accept_response(&self, id: CorrelationId, payload: Value) {
        self.pending.resolve(id, payload);
    }

    fn handle_event(&self, channel: &str, args: Vec<Value>) {
        let Some(fut) = self.listeners.dispatch(channel, args) else {
            tracing::debug!(worker = %self.name, side = %self.side(), %channel, "no listener; event dropped");
            return;
        };

        let name = self.name.clone();
        let channel = channel.to_string();
        drive(fut, move |result| {
            if let Err(e) = result {
                tracing::error!(worker = %name, %channel, error = %e, "event listener failed");
            }
        });
    }

    /// Answers an async request. A failing or missing listener sends nothing,
    /// which leaves the requester waiting.
    fn handle_request(self: &Arc<Self>, channel: String, args: Vec<Value>, id: CorrelationId) {
        let Some(fut) = self.listeners.dispatch(&channel, args) else {
            tracing::debug!(worker = %self.name, side = %self.side(), %channel, %id, "no listener; request dropped");
            return;
        };

        let this = self.clone();
        drive(fut, move |result| match result {
            Ok(value) => {
                if let Err(e) = this.send(&Envelope::response(channel.as_str(), value, id)) {
                    tracing::warn!(worker = %this.name, %channel, %id, error = %e, "could not send response");
                }
            }
            Err(e) => {
                tracing::error!(worker = %this.name, %channel, %id, error = %e, "request listener failed; no response sent");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::transport::DuplexTransport;

    fn endpoint(side: Side, config: &BridgeConfig) -> (Arc<Endpoint>, DuplexTransport) {
        let (ours, theirs) = DuplexTransport::pair();
        (Arc::new(Endpoint::new(side, Arc::new(ours), config)), theirs)
    }

    #[tokio::test]
    async fn test_abandoned_request_leaves_no_entry() {
        let (host, _worker) = endpoint(Side::Host, &BridgeConfig::new());

        let waited = tokio::time::timeout(Duration::from_millis(20), host.request("never", &())).await;
        assert!(waited.is_err());
        assert!(host.pending.is_empty());
    }

    #[tokio::test]
    async fn test_request_timeout_leaves_no_entry() {
        let config = BridgeConfig::new().request_timeout(Duration::from_millis(20));
        let (host, _worker) = endpoint(Side::Host, &config);

        assert!(matches!(host.request("never", &()).await, Err(Error::Timeout)));
        assert!(host.pending.is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_leaves_no_entry() {
        let (host, worker) = endpoint(Side::Host, &BridgeConfig::new());
        drop(worker);

        assert!(matches!(host.request("gone", &()).await, Err(Error::Transport(_))));
        assert!(host.pending.is_empty());
    }

    #[tokio::test]
    async fn test_response_resolves_request() {
        let (host, worker) = endpoint(Side::Host, &BridgeConfig::new());

        let responder = tokio::spawn(async move {
            let packet = worker.recv().await.unwrap().unwrap();
            let request = Envelope::decode(&packet.bytes).unwrap();
            let Kind::Request(id) = request.kind() else { panic!("expected a request") };
            worker
                .send(Packet::new(Envelope::response("add", json!(5), id).encode().unwrap()))
                .unwrap();
            worker
        });

        let pump = host.clone();
        let request = tokio::spawn(async move { pump.request("add", &(2, 3)).await });
        let worker = responder.await.unwrap();

        let packet = host.recv().await.unwrap().unwrap();
        let envelope = host.decode(&packet).unwrap();
        assert!(matches!(host.route(envelope), Routed::Handled));

        assert_eq!(request.await.unwrap().unwrap(), json!(5));
        assert!(host.pending.is_empty());
        drop(worker);
    }
}
