//! Error types shared by the consolidation core and the service host.

use std::path::PathBuf;
use thiserror::Error;

/// The wake timer buffer failed validation. The whole buffer is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("record at offset {offset} overruns buffer of {len} bytes")]
    RecordOverrun { offset: usize, len: usize },

    #[error("record at offset {offset} links {next} bytes ahead, beyond buffer of {len} bytes")]
    NextOutOfBounds { offset: usize, next: usize, len: usize },
}

/// The wake timer list could not be obtained this pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("wake timer list does not fit in {limit} bytes")]
    BufferLimit { limit: usize },

    #[error("wake timer query failed with status {status:#010x}")]
    Status { status: u32 },
}

/// The synthetic resume timer could not be created or armed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("failed to create resume timer (os error {0})")]
    Create(u32),

    #[error("failed to arm resume timer (os error {0})")]
    Arm(u32),

    #[error("fire time {0} is not representable as a FILETIME")]
    OutOfRange(u64),
}

/// Settings could not be located or read.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot determine executable path: {0}")]
    ExecutablePath(#[source] std::io::Error),

    #[error("executable path {0} has no file name")]
    NoFileName(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
