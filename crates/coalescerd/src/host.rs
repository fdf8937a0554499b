//! Command entry points.

use anyhow::Result;
use coalescer_common::Settings;
use std::path::PathBuf;

/// Settings from `--config`, or from the file next to the executable.
pub fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    Ok(Settings::load(&path)?)
}

#[cfg(windows)]
mod imp {
    use super::load_settings;
    use crate::driver::Driver;
    use crate::listing::WakeTimerReport;
    use crate::logging::{self, LogTarget};
    use crate::windows::{self, service, WinWakeApi};
    use anyhow::{Context, Result};
    use coalescer_common::guard::PASS_INTERVAL;
    use coalescer_common::SuspendGuard;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tracing::info;

    pub fn service(config: Option<PathBuf>) -> Result<()> {
        windows::harden_dll_search();
        service::dispatch(service::Launch {
            settings_path: config,
        })
    }

    pub fn console(config: Option<PathBuf>) -> Result<()> {
        windows::harden_dll_search();
        let settings = load_settings(config)?;
        logging::init(&LogTarget::Stdout, &settings.logging.level)?;

        let api = WinWakeApi::load()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build runtime")?;

        runtime.block_on(async move {
            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, stopping");
                }
                stop_tx.send_replace(true);
            });

            let guard = Arc::new(SuspendGuard::new(PASS_INTERVAL));
            Driver::new(api, guard, settings.consolidation(), PASS_INTERVAL)
                .run(stop_rx)
                .await;
        });
        Ok(())
    }

    pub fn list(config: Option<PathBuf>, json: bool) -> Result<()> {
        windows::harden_dll_search();
        let settings = load_settings(config)?;
        let api = WinWakeApi::load()?;
        let report = WakeTimerReport::collect(&api, &settings.consolidation())?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.render());
        }
        Ok(())
    }
}

#[cfg(not(windows))]
mod imp {
    use anyhow::{bail, Result};
    use std::path::PathBuf;

    const UNSUPPORTED: &str = "wake timer consolidation requires the Windows power manager";

    pub fn service(_config: Option<PathBuf>) -> Result<()> {
        bail!(UNSUPPORTED)
    }

    pub fn console(_config: Option<PathBuf>) -> Result<()> {
        bail!(UNSUPPORTED)
    }

    pub fn list(_config: Option<PathBuf>, _json: bool) -> Result<()> {
        bail!(UNSUPPORTED)
    }
}

pub use imp::{console, list, service};
