//! # Bridge Configuration
//!
//! Knobs shared by a host handle and the worker it spawns. The defaults keep
//! the bare protocol contract: no timeouts anywhere and best-effort reads of the
//! shared slot.

use std::time::Duration;

/// Default size of the shared response slot's payload area.
pub const DEFAULT_SLOT_CAPACITY: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Names the worker thread and tags log lines.
    pub name: String,
    /// Payload bytes available to a single blocking response.
    pub slot_capacity: usize,
    /// Bound on async `request` round trips. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Bound on blocking waits. `None` parks the worker thread until answered.
    pub sync_timeout: Option<Duration>,
    /// Fail a blocking call whose slot was answered under a different id,
    /// instead of logging and returning whatever the slot holds.
    pub strict_sync_ids: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            request_timeout: None,
            sync_timeout: None,
            strict_sync_ids: false,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn slot_capacity(mut self, bytes: usize) -> Self {
        self.slot_capacity = bytes;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    pub fn strict_sync_ids(mut self, strict: bool) -> Self {
        self.strict_sync_ids = strict;
        self
    }
}
