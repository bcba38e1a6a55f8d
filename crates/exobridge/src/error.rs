//! # Error Definitions
//!
//! Failures surfaced to callers of a host handle or worker client.
//!
//! Most protocol trouble never reaches here: missing listeners and failing
//! listeners are logged and degrade to dropped messages or `null` answers.
//! What does reach the caller is local (encoding, a closed link, a timeout the
//! caller asked for) or fatal (a context call with nobody to answer it).

use neowire::CorrelationId;

use crate::transport;

#[derive(Debug)]
pub enum Error {
    Transport(transport::Error),
    Wire(neowire::Error),
    Slot(neoslot::Error),
    /// A blocking call was issued before the shared slot arrived.
    NotReady,
    /// A configured request or sync timeout elapsed.
    Timeout,
    /// The link closed while the caller was waiting.
    ChannelClosed,
    /// Strict mode: the slot was answered for a different call.
    IdMismatch { expected: CorrelationId, received: u32 },
    /// A context call arrived at a host without a context handler.
    MissingContextHandler { function: String },
    /// `start` was called on a handle whose worker already runs.
    AlreadyStarted,
    /// The worker thread could not be started.
    Spawn(std::io::Error),
    /// The worker's async runtime could not be built.
    Runtime(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::Slot(e) => write!(f, "Slot error: {}", e),
            Self::NotReady => write!(f, "Shared response slot has not been received yet"),
            Self::Timeout => write!(f, "Request timed out"),
            Self::ChannelClosed => write!(f, "Channel closed"),
            Self::IdMismatch { expected, received } => {
                write!(f, "Sync response id mismatch: expected {}, received {}", expected, received)
            }
            Self::MissingContextHandler { function } => {
                write!(f, "No context handler registered for sync call to '{}'", function)
            }
            Self::AlreadyStarted => write!(f, "Worker already started"),
            Self::Spawn(e) => write!(f, "Failed to spawn worker: {}", e),
            Self::Runtime(msg) => write!(f, "Worker runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<neowire::Error> for Error {
    fn from(e: neowire::Error) -> Self {
        Self::Wire(e)
    }
}

impl From<neoslot::Error> for Error {
    fn from(e: neoslot::Error) -> Self {
        match e {
            neoslot::Error::Timeout => Self::Timeout,
            other => Self::Slot(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
