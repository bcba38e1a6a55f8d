//! # Correlation Ids
//!
//! Ids are `u32` so a worker's id fits the slot's wait cell. Each side steps
//! its own counter by two: the worker hands out odd ids, the host even ones.
//! An endpoint can therefore classify any inbound id without a lookup: one it
//! owns is an answer to its own request, anything else is the peer asking.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

/// Links a request envelope to its response. Decimal string on the wire.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CorrelationId(pub u32);

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(CorrelationId)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct IdVisitor;

        impl de::Visitor<'_> for IdVisitor {
            type Value = CorrelationId;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a correlation id as a decimal string or unsigned integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<CorrelationId, E> {
                v.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<CorrelationId, E> {
                u32::try_from(v)
                    .map(CorrelationId)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Which end of a host/worker pair an endpoint is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Host,
    Worker,
}

impl Side {
    fn parity(self) -> u32 {
        match self {
            Side::Host => 0,
            Side::Worker => 1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Host => write!(f, "host"),
            Side::Worker => write!(f, "worker"),
        }
    }
}

/// Monotonic id source for one side.
#[derive(Debug)]
pub struct IdAllocator {
    side: Side,
    pub(crate) next: AtomicU32,
}

impl IdAllocator {
    pub fn new(side: Side) -> Self {
        let first = match side {
            Side::Host => 2,
            Side::Worker => 1,
        };
        Self { side, next: AtomicU32::new(first) }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Hands out the next id. Wraps around at `u32::MAX`, keeping parity.
    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(2, Ordering::Relaxed))
    }

    /// Returns true if `id` came from this allocator's side.
    pub fn owns(&self, id: CorrelationId) -> bool {
        id.0 % 2 == self.side.parity()
    }
}
