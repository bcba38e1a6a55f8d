//! # NeoWire
//!
//! The message shapes exchanged between a host and its workers.
//!
//! ## Architecture
//!
//! - [`Envelope`]: a positional tuple `[channel, payload, id?, sync?, fn?]`
//!   carried over the ordered in-process transport. The transport frames
//!   messages, so envelopes carry no length prefix.
//! - [`response`]: the JSON payload written into the shared response slot for
//!   blocking calls. Only this payload needs explicit length framing, which the
//!   slot itself provides.
//! - [`CorrelationId`] / [`IdAllocator`]: per-side id spaces that never collide,
//!   so a receiver can tell its own responses apart from the peer's requests.

pub mod channels;
pub mod envelope;
pub mod id;
pub mod response;

#[cfg(test)]
mod tests;

pub use envelope::Envelope;
pub use envelope::Kind;
pub use envelope::to_args;
pub use id::CorrelationId;
pub use id::IdAllocator;
pub use id::Side;

/// Codec errors.
#[derive(Debug)]
pub enum Error {
    /// A value could not be turned into JSON.
    Encode(serde_json::Error),
    /// Bytes did not hold a well-formed envelope or payload.
    Decode(serde_json::Error),
    /// The channel name is reserved for the protocol itself.
    ReservedChannel(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "Encode error: {}", e),
            Self::Decode(e) => write!(f, "Decode error: {}", e),
            Self::ReservedChannel(name) => write!(f, "Channel '{}' is reserved", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) | Self::Decode(e) => Some(e),
            Self::ReservedChannel(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
