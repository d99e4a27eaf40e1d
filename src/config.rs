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

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::backlight::{DeviceRegistry, SourceSensor};
use crate::calibration::CurveProfile;
use crate::error::{Result, SyncError};
use crate::recovery::{is_safe_module_name, ModprobeReloader, RecoveryManager};
use crate::sync::{SyncEngine, SyncSettings};

pub const DEFAULT_BASE_DIR: &str = "/sys/class/backlight";
pub const DEFAULT_SOURCE_ID: &str = "intel_backlight";
pub const DEFAULT_DRIVER_MODULE: &str = "ddcci_backlight";
pub const DEFAULT_SLEEP_TIME_S: f64 = 2.0;
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncConfig {
    /// Seconds between two polls of the source panel
    pub sleep_time_s: f64,
    pub quiet: bool,
    pub curve: CurveProfile,
    pub base_dir: PathBuf,
    pub source_id: String,
    pub driver_module: String,
    pub reload_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sleep_time_s: DEFAULT_SLEEP_TIME_S,
            quiet: true,
            curve: CurveProfile::default(),
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            source_id: DEFAULT_SOURCE_ID.to_string(),
            driver_module: DEFAULT_DRIVER_MODULE.to_string(),
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
        }
    }
}

fn is_safe_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 128 || s == "." || s == ".." { return false; }
    s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.sleep_time_s.is_finite() || self.sleep_time_s <= 0.0 {
            return Err(SyncError::invalid_config("sleep_time", "must be a positive number of seconds"));
        }
        if self.sleep_time_s > 86_400.0 {
            return Err(SyncError::invalid_config("sleep_time", "must be at most one day"));
        }
        if !is_safe_label(&self.source_id) {
            return Err(SyncError::invalid_config("source_id", format!("invalid device name '{}'", self.source_id)));
        }
        if !is_safe_module_name(&self.driver_module) {
            return Err(SyncError::invalid_config("driver_module", format!("invalid module name '{}'", self.driver_module)));
        }
        if self.reload_timeout.is_zero() {
            return Err(SyncError::invalid_config("reload_timeout", "must be non-zero"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_time_s)
    }

    /// Validate, then wire up the engine with the real modprobe reloader.
    pub fn build_engine(&self) -> Result<SyncEngine> {
        self.validate()?;
        let reloader = ModprobeReloader::new(self.driver_module.clone(), self.reload_timeout);
        Ok(SyncEngine::new(
            DeviceRegistry::new(&self.base_dir, &self.source_id),
            SourceSensor::new(self.base_dir.join(&self.source_id)),
            self.curve.build(),
            RecoveryManager::new(Box::new(reloader)),
            SyncSettings { interval: self.interval(), quiet: self.quiet },
        ))
    }
}
