//! Shared core for the wake timer coalescer.
//!
//! Everything here is platform independent: decoding the power manager's wake
//! timer list, choosing the timer to cover, and the suspend/resume guard. The
//! OS bindings live in `coalescerd`.

pub mod consolidate;
pub mod error;
pub mod guard;
pub mod settings;
pub mod ticks;
pub mod wake_record;

pub use consolidate::{consolidate, select_target, ConsolidationSettings, Decision, Target};
pub use error::{ParseError, QueryError, SettingsError, TimerError};
pub use guard::{PassToken, SuspendGuard};
pub use settings::Settings;
pub use wake_record::{parse_wake_timer_list, Requester, WakeRecordWriter, WakeTimerEntry};
