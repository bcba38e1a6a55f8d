//! # Region Layout
//!
//! ```text
//! word[0]  u32  last published correlation id (the wait cell)
//! word[1]  u32  payload length in bytes
//! data[..]  u8  payload, `capacity` bytes
//! ```
//!
//! Every cell is atomic. The data bytes are written and read with relaxed
//! ordering; the release store of `word[0]` and the acquire load on the waiting
//! side are what make a published payload visible.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU8;

/// Index of the correlation id / wait cell.
pub const ID_WORD: usize = 0;
/// Index of the payload length cell.
pub const LEN_WORD: usize = 1;
/// Number of header words preceding the payload.
pub const HEADER_WORDS: usize = 2;

pub(crate) struct Region {
    pub(crate) header: [AtomicU32; HEADER_WORDS],
    pub(crate) data: Box<[AtomicU8]>,
}

impl Region {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            header: [AtomicU32::new(0), AtomicU32::new(0)],
            data: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    pub(crate) fn id_cell(&self) -> &AtomicU32 {
        &self.header[ID_WORD]
    }

    pub(crate) fn len_cell(&self) -> &AtomicU32 {
        &self.header[LEN_WORD]
    }
}
