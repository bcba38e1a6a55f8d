//! # NeoSlot
//!
//! A single-slot shared response region. One writer publishes a
//! length-prefixed payload tagged with a correlation id; one waiter blocks its
//! OS thread until the id cell changes, then reads the payload back.
//!
//! ## Protocol
//!
//! - **Writer**: payload bytes, then length, then the id (release), then wake.
//! - **Waiter**: snapshot the id *before* issuing the request, block while the
//!   id still equals the snapshot, then read length and bytes.
//!
//! The slot has no queue. Two waiters sharing one slot will read each other's
//! answers; serializing access is the caller's job.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

mod futex;
pub mod layout;


pub use futex::futex_wait;
pub use futex::futex_wake;

use layout::Region;

/// Slot errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A slot needs room for at least one payload byte.
    ZeroCapacity,
    /// The capacity cannot be described by the 32-bit length cell.
    CapacityTooLarge(usize),
    /// The payload does not fit the region.
    PayloadTooLarge { len: usize, capacity: usize },
    /// The length cell holds a value larger than the region.
    CorruptLength { len: usize, capacity: usize },
    /// The id cell did not change before the deadline.
    Timeout,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "slot capacity must be non-zero"),
            Self::CapacityTooLarge(cap) => write!(f, "slot capacity {} does not fit in u32", cap),
            Self::PayloadTooLarge { len, capacity } => {
                write!(f, "payload of {} bytes exceeds slot capacity of {} bytes", len, capacity)
            }
            Self::CorruptLength { len, capacity } => {
                write!(f, "length cell reads {} bytes but slot holds {}", len, capacity)
            }
            Self::Timeout => write!(f, "timed out waiting on slot"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle to a shared response region.
///
/// Cloning the handle shares the region; both the allocating side and the side
/// it was handed to see the same cells.
#[derive(Clone)]
pub struct SharedSlot {
    region: Arc<Region>,
}

impl SharedSlot {
    /// Allocates a zeroed region able to hold `capacity` payload bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if u32::try_from(capacity).is_err() {
            return Err(Error::CapacityTooLarge(capacity));
        }
        Ok(Self { region: Arc::new(Region::new(capacity)) })
    }

    pub fn capacity(&self) -> usize {
        self.region.data.len()
    }

    /// The last published correlation id.
    pub fn current_id(&self) -> u32 {
        self.region.id_cell().load(Ordering::Acquire)
    }

    /// Returns true if both handles refer to the same region.
    pub fn same_region(&self, other: &SharedSlot) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// Writes `payload` under `id` and wakes the waiter.
    ///
    /// The id cell is stored last so a woken waiter never sees a partial
    /// payload.
    pub fn publish(&self, id: u32, payload: &[u8]) -> Result<()> {
        let capacity = self.capacity();
        if payload.len() > capacity {
            return Err(Error::PayloadTooLarge { len: payload.len(), capacity });
        }

        for (cell, byte) in self.region.data.iter().zip(payload) {
            cell.store(*byte, Ordering::Relaxed);
        }
        self.region.len_cell().store(payload.len() as u32, Ordering::Relaxed);
        self.region.id_cell().store(id, Ordering::Release);
        futex_wake(self.region.id_cell());
        Ok(())
    }

    /// Publishes `id` with a zero-length payload. The data bytes are left as
    /// they were.
    pub fn publish_empty(&self, id: u32) {
        self.region.len_cell().store(0, Ordering::Relaxed);
        self.region.id_cell().store(id, Ordering::Release);
        futex_wake(self.region.id_cell());
    }

    /// Signals the wait cell without touching any state.
    pub fn notify(&self) {
        futex_wake(self.region.id_cell());
    }

    /// Blocks the current thread until the id cell differs from `prior`.
    ///
    /// Returns the new id. With a timeout, gives up with [`Error::Timeout`]
    /// once the deadline passes. A timeout too large to express as a deadline
    /// waits forever.
    pub fn wait_for_change(&self, prior: u32, timeout: Option<Duration>) -> Result<u32> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let cell = self.region.id_cell();

        loop {
            let current = cell.load(Ordering::Acquire);
            if current != prior {
                return Ok(current);
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            futex_wait(cell, prior, remaining);
        }
    }

    /// Copies out the payload named by the length cell.
    pub fn read_payload(&self) -> Result<Vec<u8>> {
        let capacity = self.capacity();
        let len = self.region.len_cell().load(Ordering::Relaxed) as usize;
        if len > capacity {
            return Err(Error::CorruptLength { len, capacity });
        }

        Ok(self.region.data[..len]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect())
    }
}

impl std::fmt::Debug for SharedSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSlot")
            .field("capacity", &self.capacity())
            .field("current_id", &self.current_id())
            .finish()
    }
}
