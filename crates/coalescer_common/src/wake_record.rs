//! Wake timer list decoding.
//!
//! The power manager reports pending wake timers as a chain of variable
//! offset records. The layout is not a published contract, so every read is
//! bounds checked and any structural inconsistency rejects the whole buffer:
//! once one link is wrong, every later offset is meaningless.
//!
//! ```text
//! record (64 bytes)                diagnostic context (40 bytes)
//! +0  u32 offset to next (0=end)   +0  u32 size
//! +8  u64 due time (ticks)         +8  u32 requester kind
//! +16 u32 period                   +16 u32 image name offset
//! +24 diagnostic context  -------> +24 u32 process id
//!                                  +28 u32 service tag
//!                                  +32 u32 reason offset
//! ```

use crate::error::ParseError;
use serde::{Deserialize, Serialize};

/// Size of the fixed part of a record
pub const RECORD_SIZE: usize = 64;

/// Minimum legal diagnostic context size
pub const CONTEXT_MIN_SIZE: usize = 40;

const NEXT_OFFSET: usize = 0;
const DUE_TIME: usize = 8;
const PERIOD: usize = 16;
const CONTEXT: usize = 24;

const CONTEXT_SIZE: usize = 0;
const CONTEXT_KIND: usize = 8;
const CONTEXT_PROCESS_ID: usize = 24;

/// Who asked for a wake timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    Kernel,
    UserProcess,
    UserSharedService,
    /// Kind value outside the known set
    Other(u32),
    /// Diagnostic context failed bounds checks
    Unverified,
}

impl Requester {
    pub fn from_raw(kind: u32) -> Self {
        match kind {
            0 => Self::Kernel,
            1 => Self::UserProcess,
            2 => Self::UserSharedService,
            other => Self::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Kernel | Self::Unverified => 0,
            Self::UserProcess => 1,
            Self::UserSharedService => 2,
            Self::Other(kind) => kind,
        }
    }

    /// Whether the context's process id names the requester
    pub fn has_process(self) -> bool {
        matches!(self, Self::UserProcess | Self::UserSharedService)
    }
}

/// One pending wake timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeTimerEntry {
    /// Ticks from the moment of the query until the timer is due
    pub due_time: u64,
    pub requester: Requester,
    /// Owning process, when the requester is a process or service
    pub owner: Option<u32>,
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Decode the diagnostic context of the record at `offset`.
///
/// Caller guarantees the fixed record is in bounds.
fn read_requester(buf: &[u8], offset: usize) -> (Requester, Option<u32>) {
    let context = offset + CONTEXT;
    let size = read_u32(buf, context + CONTEXT_SIZE) as usize;
    let trusted = size >= CONTEXT_MIN_SIZE
        && size <= buf.len()
        && context
            .checked_add(size)
            .is_some_and(|end| end <= buf.len());
    if !trusted {
        return (Requester::Unverified, None);
    }

    let requester = Requester::from_raw(read_u32(buf, context + CONTEXT_KIND));
    let owner = requester
        .has_process()
        .then(|| read_u32(buf, context + CONTEXT_PROCESS_ID));
    (requester, owner)
}

/// Parse a wake timer list buffer into entries sorted by due time.
pub fn parse_wake_timer_list(buf: &[u8]) -> Result<Vec<WakeTimerEntry>, ParseError> {
    let len = buf.len();
    let mut entries = Vec::new();
    let mut offset = 0usize;

    loop {
        if offset
            .checked_add(RECORD_SIZE)
            .map_or(true, |end| end > len)
        {
            return Err(ParseError::RecordOverrun { offset, len });
        }

        let (requester, owner) = read_requester(buf, offset);
        entries.push(WakeTimerEntry {
            due_time: read_u64(buf, offset + DUE_TIME),
            requester,
            owner,
        });

        let next = read_u32(buf, offset + NEXT_OFFSET) as usize;
        if next == 0 {
            break;
        }
        if next > len {
            return Err(ParseError::NextOutOfBounds { offset, next, len });
        }
        offset += next;
    }

    entries.sort_by_key(|entry| entry.due_time);
    Ok(entries)
}

/// Builds buffers in the power manager's wake timer list layout.
///
/// Used by the fake OS seam and by tests; the service itself only decodes.
#[derive(Debug, Default, Clone)]
pub struct WakeRecordWriter {
    buf: Vec<u8>,
    last: Option<usize>,
}

impl WakeRecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with a well-formed diagnostic context.
    pub fn push(&mut self, due_time: u64, requester: Requester, process_id: u32) -> &mut Self {
        self.push_with_context_size(due_time, requester, process_id, CONTEXT_MIN_SIZE as u32)
    }

    /// Append a record whose diagnostic context claims `context_size` bytes.
    pub fn push_with_context_size(
        &mut self,
        due_time: u64,
        requester: Requester,
        process_id: u32,
        context_size: u32,
    ) -> &mut Self {
        let offset = self.buf.len();
        if let Some(prev) = self.last {
            let link = (offset - prev) as u32;
            self.buf[prev + NEXT_OFFSET..prev + NEXT_OFFSET + 4].copy_from_slice(&link.to_le_bytes());
        }

        let mut record = [0u8; RECORD_SIZE];
        record[DUE_TIME..DUE_TIME + 8].copy_from_slice(&due_time.to_le_bytes());
        record[PERIOD..PERIOD + 4].copy_from_slice(&0u32.to_le_bytes());
        let context = CONTEXT;
        record[context + CONTEXT_SIZE..context + CONTEXT_SIZE + 4]
            .copy_from_slice(&context_size.to_le_bytes());
        record[context + CONTEXT_KIND..context + CONTEXT_KIND + 4]
            .copy_from_slice(&requester.to_raw().to_le_bytes());
        record[context + CONTEXT_PROCESS_ID..context + CONTEXT_PROCESS_ID + 4]
            .copy_from_slice(&process_id.to_le_bytes());

        self.buf.extend_from_slice(&record);
        self.last = Some(offset);
        self
    }

    /// Append zero bytes after the last record, as a kernel-filled buffer has.
    pub fn pad_to(&mut self, len: usize) -> &mut Self {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }
}
