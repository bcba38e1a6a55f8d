//! Reserved channel names.

use crate::Error;
use crate::Result;

/// Carries the shared response slot from host to worker, once per worker.
pub const SETUP: &str = "@@sab";

/// Carries synchronous calls dispatched by function name.
pub const CONTEXT: &str = "@@request-sync-context";

pub fn is_reserved(channel: &str) -> bool {
    channel == SETUP || channel == CONTEXT
}

/// Rejects reserved names for application traffic.
pub fn check_application(channel: &str) -> Result<()> {
    if is_reserved(channel) {
        return Err(Error::ReservedChannel(channel.to_string()));
    }
    Ok(())
}
