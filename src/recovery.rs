/*
 * This file is part of backlight-sync.
 *
 * Copyright (C) 2025 backlight-sync contributors
 *
 * backlight-sync is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * backlight-sync is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with backlight-sync. If not, see <https://www.gnu.org/licenses/>.
 */

//! Driver reload and registry re-discovery
//!
//! ddcci backlight devices vanish when a monitor is unplugged or the DDC bus
//! wedges. Reloading the kernel module makes the driver probe the buses again.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(test)]
use mockall::automock;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::backlight::{DeviceRegistry, Devices};
use crate::error::{Result, SyncError};
use crate::logger;

const POLL_STEP: Duration = Duration::from_millis(50);

/// Unload-then-load of the external display driver.
#[cfg_attr(test, automock)]
pub trait DriverReloader: Send {
    fn reload(&self) -> Result<()>;
}

/// Module names are passed through a shell, so only allow what modprobe accepts.
pub fn is_safe_module_name(s: &str) -> bool {
    if s.is_empty() || s.len() > 64 { return false; }
    s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

/// Reloads a kernel module with `modprobe`, escalating through `sudo` when
/// not already root.
#[derive(Debug, Clone)]
pub struct ModprobeReloader {
    module: String,
    timeout: Duration,
    use_sudo: bool,
}

impl ModprobeReloader {
    pub fn new(module: impl Into<String>, timeout: Duration) -> Self {
        let use_sudo = unsafe { libc::geteuid() } != 0;
        Self { module: module.into(), timeout, use_sudo }
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Shell line performing both steps; the load only runs if the unload succeeded.
    pub fn command_line(&self) -> String {
        let prefix = if self.use_sudo { "sudo -n " } else { "" };
        format!(
            "{p}modprobe -r {m} && {p}modprobe {m}",
            p = prefix,
            m = self.module
        )
    }
}

impl DriverReloader for ModprobeReloader {
    fn reload(&self) -> Result<()> {
        if !is_safe_module_name(&self.module) {
            return Err(SyncError::DriverReload(format!("refusing unsafe module name '{}'", self.module)));
        }
        let line = self.command_line();
        debug!("Running: sh -c '{}'", line);
        run_with_timeout(Command::new("sh").arg("-c").arg(&line), &self.module, self.timeout)
    }
}

fn run_with_timeout(cmd: &mut Command, module: &str, timeout: Duration) -> Result<()> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| SyncError::DriverReload(format!("failed to spawn: {}", e)))?;

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                return Err(SyncError::DriverReload(format!("reload of {} exited with {}", module, status)));
            }
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SyncError::RecoveryTimeout { module: module.to_string(), timeout });
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(e) => return Err(SyncError::DriverReload(format!("wait failed: {}", e))),
        }
    }
}

/// Reloads the driver, then rebuilds the device registry from scratch.
pub struct RecoveryManager {
    reloader: Box<dyn DriverReloader>,
}

impl RecoveryManager {
    pub fn new(reloader: Box<dyn DriverReloader>) -> Self {
        Self { reloader }
    }

    /// Best-effort: failures are logged and never returned.
    pub fn reload_driver(&self) {
        match self.reloader.reload() {
            Ok(()) => info!("Display driver reloaded"),
            Err(e) => {
                warn!("{}", e);
                logger::log_event("driver_reload_failed", json!({ "error": e.to_string() }));
            }
        }
    }

    /// Reload the driver and return a fresh (possibly empty) registry.
    ///
    /// Only an unreadable base directory escapes as an error.
    pub fn recover(&self, registry: &DeviceRegistry) -> Result<Devices> {
        self.reload_driver();
        let devices = registry.refresh()?;
        info!("Recovered registry with {} device(s)", devices.len());
        logger::log_event(
            "recovery",
            json!({ "devices": devices.ids().collect::<Vec<_>>() }),
        );
        Ok(devices)
    }
}
