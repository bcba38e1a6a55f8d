//! # Host Handle
//!
//! The coordinating side of a host/worker pair. Spawning a worker allocates
//! the shared response slot, hands it over with the setup envelope, and starts
//! the host pump on the caller's tokio runtime.
//!
//! The host never blocks. Blocking requests from the worker are dispatched
//! like any other, and their results are published into the slot when the
//! listener finishes. A blocking caller is always woken, with `null` if there
//! was no listener or the listener failed. The one exception is a context
//! request with no context handler: that stops the pump with
//! [`Error::MissingContextHandler`] and leaves the caller parked.
//!
//! A worker lives until [`HostHandle::terminate`] is called or the last
//! handle is dropped. Shutting down while a blocking call is in flight leaves
//! that worker parked for good, and pending requests on either side never
//! complete; avoiding that is up to the caller.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::RwLock;

use neoslot::SharedSlot;
use neowire::CorrelationId;
use neowire::Envelope;
use neowire::Side;
use neowire::response::encode_response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::AbortHandle;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::context;
use crate::context::ContextCall;
use crate::context::ContextHandler;
use crate::endpoint::Endpoint;
use crate::endpoint::Routed;
use crate::error::Error;
use crate::error::Result;
use crate::listener::HandlerFuture;
use crate::listener::Listener;
use crate::listener::drive;
use crate::transport::DuplexTransport;
use crate::transport::Packet;
use crate::transport::Transport;
use crate::worker::WorkerClient;

/// Handle to a spawned worker. Clones share the same worker.
///
/// Dropping the last clone shuts the worker down the way
/// [`terminate`](Self::terminate) does, minus the thread handle. A listener
/// that captures a clone keeps the worker alive until `terminate` is called.
#[derive(Clone)]
pub struct HostHandle {
    inner: Arc<HostInner>,
    _owner: Arc<Owner>,
}

/// Shared by user-facing handles only; the host pump holds `HostInner`
/// directly, so this drops when the last handle does.
struct Owner {
    inner: Arc<HostInner>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        tracing::debug!(worker = %self.inner.endpoint.name(), "last host handle dropped");
        self.inner.shutdown();
    }
}

struct HostInner {
    config: BridgeConfig,
    endpoint: Arc<Endpoint>,
    slot: SharedSlot,
    /// The worker's end of the link, until `start` hands it to the thread.
    worker_end: Mutex<Option<DuplexTransport>>,
    context: RwLock<Option<ContextHandler>>,
    pump: Mutex<Option<JoinHandle<Result<()>>>>,
    pump_abort: OnceLock<AbortHandle>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl HostHandle {
    /// Allocates the shared slot and the link for one worker, without
    /// starting it. Listeners registered before [`start`](Self::start) are in
    /// place for the worker's very first message.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let slot = SharedSlot::new(config.slot_capacity)?;
        let (host_end, worker_end) = DuplexTransport::pair();

        // queued ahead of everything else the worker will read
        let setup = Envelope::setup().encode()?;
        host_end.send(Packet::with_transfer(setup, slot.clone()))?;

        let inner = Arc::new(HostInner {
            endpoint: Arc::new(Endpoint::new(Side::Host, Arc::new(host_end), &config)),
            config,
            slot,
            worker_end: Mutex::new(Some(worker_end)),
            context: RwLock::new(None),
            pump: Mutex::new(None),
            pump_abort: OnceLock::new(),
            thread: Mutex::new(None),
        });

        Ok(Self { _owner: Arc::new(Owner { inner: inner.clone() }), inner })
    }

    /// Starts the worker thread running `entry`, and the host pump.
    ///
    /// `entry` runs on the worker's own single-threaded runtime once the
    /// shared slot has arrived, so it may block on [`WorkerClient::request_sync`]
    /// and its future need not be `Send`. It receives `init` unchanged.
    ///
    /// Must be called from within a tokio runtime, which drives the host pump.
    /// A handle starts at most once.
    pub fn start<F, Fut>(&self, init: Value, entry: F) -> Result<()>
    where
        F: FnOnce(WorkerClient, Value) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(e.to_string()))?;

        let worker_end = lock(&self.inner.worker_end).take().ok_or(Error::AlreadyStarted)?;
        let worker_transport: Arc<dyn Transport> = Arc::new(worker_end);
        let worker_config = self.inner.config.clone();

        let thread = std::thread::Builder::new()
            .name(self.inner.config.name.clone())
            .spawn(move || run_worker(worker_transport, worker_config, init, entry))
            .map_err(Error::Spawn)?;
        *lock(&self.inner.thread) = Some(thread);

        let pump = runtime.spawn(self.inner.clone().pump());
        let _ = self.inner.pump_abort.set(pump.abort_handle());
        *lock(&self.inner.pump) = Some(pump);

        tracing::debug!(worker = %self.name(), capacity = self.inner.slot.capacity(), "worker started");
        Ok(())
    }

    /// [`new`](Self::new) followed by [`start`](Self::start), for hosts that
    /// register their listeners afterwards and accept that the worker's
    /// earliest messages may find none.
    pub fn spawn<F, Fut>(config: BridgeConfig, init: Value, entry: F) -> Result<Self>
    where
        F: FnOnce(WorkerClient, Value) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let host = Self::new(config)?;
        host.start(init, entry)?;
        Ok(host)
    }

    pub fn name(&self) -> &str {
        self.inner.endpoint.name()
    }

    /// The shared response slot handed to this worker.
    pub fn slot(&self) -> &SharedSlot {
        &self.inner.slot
    }

    /// Sends a fire-and-forget message to the worker.
    ///
    /// `args` spread into positional arguments (see [`neowire::to_args`]): pass
    /// one argument as `&(x,)`, since a bare sequence spreads and a bare `null`
    /// or `None` sends no arguments at all.
    pub fn call<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<()> {
        self.inner.endpoint.call(channel, args)
    }

    /// Sends a request to the worker and waits for its response.
    ///
    /// `args` spread into positional arguments (see [`neowire::to_args`]): pass
    /// one argument as `&(x,)`, since a bare sequence spreads and a bare `null`
    /// or `None` sends no arguments at all.
    pub async fn request<A: Serialize + ?Sized>(&self, channel: &str, args: &A) -> Result<Value> {
        self.inner.endpoint.request(channel, args).await
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

    /// Installs the handler for by-name blocking calls, replacing any previous one.
    pub fn on_context_handler<F, Fut>(&self, f: F)
    where
        F: Fn(ContextCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.set_context(context::handler(f));
    }

    /// Installs a context handler over a typed operation enum; see
    /// [`ContextCall::decode`].
    pub fn on_context<K, F, Fut>(&self, f: F)
    where
        K: DeserializeOwned + Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.set_context(context::typed_handler(f));
    }

    fn set_context(&self, handler: ContextHandler) {
        let mut slot = self.inner.context.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handler);
    }

    /// Publishes `value` as the answer to blocking call `id` and wakes the caller.
    pub fn write_shared_array(&self, id: CorrelationId, value: &Value) {
        self.inner.write_shared_array(id, value);
    }

    /// Wakes the blocking caller `id` with an empty answer, which it reads as `null`.
    pub fn wake_thread(&self, id: CorrelationId) {
        self.inner.wake_thread(id);
    }

    /// Waits for the host pump to stop. Returns the fatal error that stopped
    /// it, if any. Only the first caller observes the outcome.
    pub async fn closed(&self) -> Result<()> {
        let pump = lock(&self.inner.pump).take();
        let Some(pump) = pump else { return Ok(()) };

        match pump.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::Runtime(e.to_string())),
        }
    }

    /// Closes the link and stops the host pump.
    ///
    /// The worker's pump ends once it drains what was already sent; its thread
    /// exits when `entry` has also returned. The thread handle is returned the
    /// first time, for callers that want to join it.
    pub fn terminate(&self) -> Option<std::thread::JoinHandle<()>> {
        tracing::debug!(worker = %self.name(), "terminating worker");
        self.inner.shutdown();
        lock(&self.inner.thread).take()
    }
}

impl HostInner {
    fn shutdown(&self) {
        self.endpoint.close();
        if let Some(abort) = self.pump_abort.get() {
            abort.abort();
        }
    }

    async fn pump(self: Arc<Self>) -> Result<()> {
        let endpoint = self.endpoint.clone();

        loop {
            let packet = match endpoint.recv().await {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => return Err(e),
            };

            let Some(envelope) = endpoint.decode(&packet) else { continue };

            match endpoint.route(envelope) {
                Routed::Handled => {}
                Routed::Sync { channel, args, id } => self.answer_sync(channel, args, id),
                Routed::Context { id, call } => {
                    let handler = self
                        .context
                        .read()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .clone();

                    let Some(handler) = handler else {
                        tracing::error!(
                            worker = %endpoint.name(),
                            function = %call.function,
                            %id,
                            "context request with no context handler registered"
                        );
                        return Err(Error::MissingContextHandler { function: call.function });
                    };

                    let label = call.function.clone();
                    self.settle(handler(call), id, label);
                }
            }
        }

        tracing::debug!(worker = %endpoint.name(), "host link closed");
        Ok(())
    }

    fn answer_sync(self: &Arc<Self>, channel: String, args: Vec<Value>, id: CorrelationId) {
        let Some(fut) = self.endpoint.listeners.dispatch(&channel, args) else {
            tracing::debug!(worker = %self.endpoint.name(), %channel, %id, "no listener for blocking request; waking caller");
            self.wake_thread(id);
            return;
        };
        self.settle(fut, id, channel);
    }

    /// Publishes the listener's result, or wakes the caller empty-handed if it
    /// failed.
    fn settle(self: &Arc<Self>, fut: HandlerFuture, id: CorrelationId, label: String) {
        let this = self.clone();
        drive(fut, move |result| match result {
            Ok(value) => this.write_shared_array(id, &value),
            Err(e) => {
                tracing::error!(worker = %this.endpoint.name(), target = %label, %id, error = %e, "blocking listener failed; waking caller");
                this.wake_thread(id);
            }
        });
    }

    fn write_shared_array(&self, id: CorrelationId, value: &Value) {
        let written = encode_response(Some(value))
            .map_err(Error::from)
            .and_then(|bytes| self.slot.publish(id.0, &bytes).map_err(Error::from));

        if let Err(e) = written {
            tracing::error!(worker = %self.endpoint.name(), %id, error = %e, "could not write blocking response; waking caller");
            self.wake_thread(id);
        }
    }

    fn wake_thread(&self, id: CorrelationId) {
        self.slot.publish_empty(id.0);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_worker<F, Fut>(transport: Arc<dyn Transport>, config: BridgeConfig, init: Value, entry: F)
where
    F: FnOnce(WorkerClient, Value) -> Fut,
    Fut: Future<Output = ()>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(worker = %config.name, error = %e, "could not build worker runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let client = WorkerClient::new(transport, &config);
        let pump = tokio::spawn(client.clone().run());

        if let Err(e) = client.ready().await {
            tracing::error!(worker = %config.name, error = %e, "worker link closed before setup");
            return;
        }

        entry(client, init).await;

        match pump.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(worker = %config.name, error = %e, "worker pump failed"),
            Err(e) => tracing::error!(worker = %config.name, error = %e, "worker pump panicked"),
        }
    });
}
