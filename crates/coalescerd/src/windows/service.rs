//! Service control manager host.
//!
//! `ServiceMain` owns the driver. The control handler runs on the
//! dispatcher's thread and talks to the driver only through the shared
//! `ServiceContext`: the stop channel and the suspend guard.

use crate::driver::Driver;
use crate::logging::{self, LogTarget};
use crate::windows::{last_error, wide, WinWakeApi};
use anyhow::{anyhow, bail, Context, Result};
use coalescer_common::guard::{PASS_INTERVAL, SUSPEND_DRAIN_LIMIT};
use coalescer_common::settings::{sibling_path, LOG_EXTENSION};
use coalescer_common::{Settings, SuspendGuard};
use std::ffi::c_void;
use std::path::PathBuf;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tracing::{error, info, warn};
use windows_sys::core::PWSTR;
use windows_sys::Win32::Foundation::{ERROR_CALL_NOT_IMPLEMENTED, ERROR_SERVICE_SPECIFIC_ERROR, NO_ERROR};
use windows_sys::Win32::System::Services::{
    RegisterServiceCtrlHandlerExW, SetServiceStatus, StartServiceCtrlDispatcherW,
    SERVICE_ACCEPT_POWEREVENT, SERVICE_ACCEPT_STOP, SERVICE_CONTROL_INTERROGATE,
    SERVICE_CONTROL_POWEREVENT, SERVICE_CONTROL_STOP, SERVICE_RUNNING, SERVICE_START_PENDING,
    SERVICE_STATUS, SERVICE_STATUS_CURRENT_STATE, SERVICE_STOPPED, SERVICE_STOP_PENDING,
    SERVICE_TABLE_ENTRYW, SERVICE_WIN32_OWN_PROCESS,
};

/// Name registered with the service control manager
pub const SERVICE_NAME: &str = "CoalescerService";

/// Wait hint for pending states, in milliseconds
const PENDING_WAIT_HINT: u32 = 10_000;

// Power broadcast event types delivered with SERVICE_CONTROL_POWEREVENT
const PBT_APMSUSPEND: u32 = 0x0004;
const PBT_APMRESUMEAUTOMATIC: u32 = 0x0012;

/// Startup options handed from `main` to `ServiceMain`
#[derive(Debug, Clone, Default)]
pub struct Launch {
    pub settings_path: Option<PathBuf>,
}

static LAUNCH: OnceLock<Launch> = OnceLock::new();

/// State shared between `ServiceMain` and the control handler
struct ServiceContext {
    guard: Arc<SuspendGuard>,
    stop: watch::Sender<bool>,
    status: AtomicPtr<c_void>,
    checkpoint: AtomicU32,
}

impl ServiceContext {
    fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            guard: Arc::new(SuspendGuard::new(PASS_INTERVAL)),
            stop,
            status: AtomicPtr::new(null_mut()),
            checkpoint: AtomicU32::new(0),
        }
    }

    fn report(&self, state: SERVICE_STATUS_CURRENT_STATE, accepted: u32, exit_code: u32) {
        let pending = state == SERVICE_START_PENDING || state == SERVICE_STOP_PENDING;
        let status = SERVICE_STATUS {
            dwServiceType: SERVICE_WIN32_OWN_PROCESS,
            dwCurrentState: state,
            dwControlsAccepted: accepted,
            dwWin32ExitCode: exit_code,
            dwServiceSpecificExitCode: u32::from(exit_code == ERROR_SERVICE_SPECIFIC_ERROR),
            dwCheckPoint: if pending {
                self.checkpoint.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                0
            },
            dwWaitHint: if pending { PENDING_WAIT_HINT } else { 0 },
        };
        // SAFETY: handle came from RegisterServiceCtrlHandlerExW
        let ok = unsafe { SetServiceStatus(self.status.load(Ordering::SeqCst), &status) };
        if ok == 0 {
            warn!("SetServiceStatus({}) failed (os error {})", state, last_error());
        }
    }
}

/// Hand the process to the service control dispatcher. Returns when the
/// service has stopped.
pub fn dispatch(launch: Launch) -> Result<()> {
    LAUNCH
        .set(launch)
        .map_err(|_| anyhow!("Service dispatcher already started"))?;

    let mut name = wide(SERVICE_NAME);
    let table = [
        SERVICE_TABLE_ENTRYW {
            lpServiceName: name.as_mut_ptr(),
            lpServiceProc: Some(service_main),
        },
        SERVICE_TABLE_ENTRYW {
            lpServiceName: null_mut(),
            lpServiceProc: None,
        },
    ];

    // SAFETY: table is terminated and outlives the dispatcher
    if unsafe { StartServiceCtrlDispatcherW(table.as_ptr()) } == 0 {
        bail!(
            "Not started by the service control manager (os error {}); use `coalescerd run` for console mode",
            last_error()
        );
    }
    Ok(())
}

unsafe extern "system" fn service_main(_argc: u32, _argv: *mut PWSTR) {
    // Lives until the process exits; the control handler may still be
    // invoked while ServiceMain is returning.
    let context: &'static ServiceContext = Box::leak(Box::new(ServiceContext::new()));

    let name = wide(SERVICE_NAME);
    // SAFETY: name is NUL terminated, context is 'static
    let handle = unsafe {
        RegisterServiceCtrlHandlerExW(
            name.as_ptr(),
            Some(control_handler),
            (context as *const ServiceContext).cast(),
        )
    };
    if handle.is_null() {
        return;
    }
    context.status.store(handle, Ordering::SeqCst);
    context.report(SERVICE_START_PENDING, 0, NO_ERROR);

    let launch = LAUNCH.get().cloned().unwrap_or_default();
    let exit_code = match serve(context, &launch) {
        Ok(()) => NO_ERROR,
        Err(e) => {
            error!("Service failed: {:#}", e);
            ERROR_SERVICE_SPECIFIC_ERROR
        }
    };

    context.report(SERVICE_STOPPED, 0, exit_code);
}

fn serve(context: &ServiceContext, launch: &Launch) -> Result<()> {
    let exe = std::env::current_exe().context("Cannot determine executable path")?;
    let settings_path = match &launch.settings_path {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };

    // Log even when the settings turn out to be unusable
    let settings = Settings::load(&settings_path);
    let level = settings
        .as_ref()
        .map(|s| s.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    // A service has nowhere else to report a logging failure; run without logs
    let _ = logging::init(&LogTarget::File(sibling_path(&exe, LOG_EXTENSION)?), &level);
    info!("{} v{} starting", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let settings = settings?;
    let api = WinWakeApi::load()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build runtime")?;

    context.report(SERVICE_RUNNING, SERVICE_ACCEPT_STOP | SERVICE_ACCEPT_POWEREVENT, NO_ERROR);

    let driver = Driver::new(
        api,
        Arc::clone(&context.guard),
        settings.consolidation(),
        PASS_INTERVAL,
    );
    runtime.block_on(driver.run(context.stop.subscribe()));
    Ok(())
}

unsafe extern "system" fn control_handler(
    control: u32,
    event_type: u32,
    _event_data: *mut c_void,
    context: *mut c_void,
) -> u32 {
    // SAFETY: registered with a pointer to the leaked ServiceContext
    let context = unsafe { &*(context as *const ServiceContext) };

    match control {
        SERVICE_CONTROL_STOP => {
            info!("Stop requested");
            context.report(SERVICE_STOP_PENDING, 0, NO_ERROR);
            context.stop.send_replace(true);
            NO_ERROR
        }
        SERVICE_CONTROL_POWEREVENT => {
            match event_type {
                PBT_APMSUSPEND => {
                    info!("Entering suspend");
                    context.guard.on_suspend(SUSPEND_DRAIN_LIMIT);
                }
                PBT_APMRESUMEAUTOMATIC => {
                    info!("Resumed");
                    context.guard.on_resume();
                }
                _ => {}
            }
            NO_ERROR
        }
        SERVICE_CONTROL_INTERROGATE => NO_ERROR,
        _ => ERROR_CALL_NOT_IMPLEMENTED,
    }
}
