//! Wake timer list query with a growing buffer.

use crate::api::{RawStatus, WakeApi};
use coalescer_common::QueryError;
use tracing::trace;

/// First buffer size tried
pub const INITIAL_BUFFER: usize = 8 * 1024;

/// Largest buffer tried before giving up
pub const MAX_BUFFER: usize = 1024 * 1024;

/// Fetch the raw wake timer list.
///
/// The buffer doubles on each "too small" answer, up to `MAX_BUFFER`.
pub fn query_wake_timers<A: WakeApi + ?Sized>(api: &A) -> Result<Vec<u8>, QueryError> {
    let mut buffer = vec![0u8; INITIAL_BUFFER];
    loop {
        match api.wake_timer_list(&mut buffer) {
            RawStatus::Success => return Ok(buffer),
            RawStatus::BufferTooSmall if buffer.len() < MAX_BUFFER => {
                trace!("Wake timer list exceeds {} bytes, growing", buffer.len());
                buffer = vec![0u8; buffer.len() * 2];
            }
            RawStatus::BufferTooSmall => return Err(QueryError::BufferLimit { limit: MAX_BUFFER }),
            RawStatus::Failed(status) => return Err(QueryError::Status { status }),
        }
    }
}
