//! Wake timer coalescer daemon library - exposes modules for testing.

pub mod api;
pub mod driver;
pub mod host;
pub mod listing;
pub mod logging;
pub mod query;
#[cfg(windows)]
pub mod windows;

pub use api::{RawStatus, ResumeTimer, WakeApi};
pub use driver::{Driver, PassOutcome};
