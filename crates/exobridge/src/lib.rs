//! # ExoBridge
//!
//! Message passing between a host and the worker threads it spawns.
//!
//! ## Philosophy
//!
//! - **Three contracts, one pipe**: fire-and-forget `call`, async `request`,
//!   and thread-blocking `request_sync` all travel as envelopes on the same
//!   ordered transport. Only the blocking answer takes another route, through
//!   a shared slot the worker parks on.
//! - **The host never blocks**: every listener the host runs is dispatched
//!   from its pump and finished on the host's runtime. Workers are the only
//!   side that ever parks a thread.
//! - **Degrade, don't crash**: missing or failing listeners are logged. An
//!   event is dropped, a request goes unanswered, a blocking call reads
//!   `null`. The one fatal case is a context call reaching a host with no
//!   context handler.
//!
//! ## Usage
//!
//! ```ignore
//! let host = HostHandle::spawn(BridgeConfig::new().name("w1"), json!({}), |client, _init| async move {
//!     let pong = client.request_sync("ping", &()).unwrap();
//!     client.call("log", &(pong,)).unwrap();
//! })?;
//! host.on("ping", |_| Ok(json!("pong")))?;
//! ```

pub mod config;
pub mod context;
pub(crate) mod endpoint;
pub mod error;
pub mod host;
pub mod listener;
pub mod logging;
pub mod pending;
pub mod transport;
pub mod worker;

pub use config::BridgeConfig;
pub use context::ContextCall;
pub use error::Error;
pub use error::Result;
pub use host::HostHandle;
pub use listener::Listener;
pub use transport::DuplexTransport;
pub use transport::Packet;
pub use transport::Transport;
pub use worker::WorkerClient;

pub use neowire::CorrelationId;
pub use serde_json::Value;
