//! Scripted stand-in for the Windows power manager and timer APIs.

#![allow(dead_code)]

use coalescer_common::TimerError;
use coalescerd::{RawStatus, ResumeTimer, WakeApi};
use std::sync::{Arc, Mutex, MutexGuard};

/// A FILETIME in late 2025
pub const NOW: u64 = 134_000_000_000_000_000;

pub const SELF_PID: u32 = 4242;

#[derive(Debug, Default)]
pub struct FakeState {
    /// Wake timer list returned on success
    pub list: Vec<u8>,
    /// Forced status for every query
    pub status: Option<RawStatus>,
    pub now: u64,
    pub pid: u32,
    pub fail_create: bool,
    pub fail_arm: bool,
    /// Query calls, including buffer growth retries
    pub query_calls: usize,
    pub timers_created: usize,
    pub timers_live: usize,
    /// Every successful arm, in order
    pub armed: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct FakeWakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeWakeApi {
    pub fn new(list: Vec<u8>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                list,
                now: NOW,
                pid: SELF_PID,
                ..FakeState::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl WakeApi for FakeWakeApi {
    type Timer = FakeTimer;

    fn wake_timer_list(&self, buffer: &mut [u8]) -> RawStatus {
        let mut state = self.state();
        state.query_calls += 1;
        if let Some(status) = state.status {
            return status;
        }
        if buffer.len() < state.list.len() {
            return RawStatus::BufferTooSmall;
        }
        buffer[..state.list.len()].copy_from_slice(&state.list);
        RawStatus::Success
    }

    fn now(&self) -> u64 {
        self.state().now
    }

    fn current_process_id(&self) -> u32 {
        self.state().pid
    }

    fn create_timer(&self) -> Result<FakeTimer, TimerError> {
        let mut state = self.state();
        if state.fail_create {
            return Err(TimerError::Create(8));
        }
        state.timers_created += 1;
        state.timers_live += 1;
        Ok(FakeTimer {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct FakeTimer {
    state: Arc<Mutex<FakeState>>,
}

impl ResumeTimer for FakeTimer {
    fn arm(&mut self, fire_at: u64) -> Result<(), TimerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_arm {
            return Err(TimerError::Arm(87));
        }
        state.armed.push(fire_at);
        Ok(())
    }
}

impl Drop for FakeTimer {
    fn drop(&mut self) {
        self.state.lock().unwrap().timers_live -= 1;
    }
}
