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

//! sysfs backlight access
//!
//! Every device under the backlight class directory exposes integer text
//! endpoints. External monitors (ddcci) get `max_brightness` and `brightness`;
//! the built-in panel is read through `max_brightness` and `actual_brightness`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};

pub const MAX_BRIGHTNESS: &str = "max_brightness";
pub const BRIGHTNESS: &str = "brightness";
pub const ACTUAL_BRIGHTNESS: &str = "actual_brightness";

fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    let mut s = String::new();
    fs::File::open(p)?.read_to_string(&mut s)?;
    Ok(s.trim().to_string())
}

/// Read a non-negative integer endpoint. The error string is suitable for
/// the `reason` field of the caller's error variant.
fn read_value(path: &Path) -> std::result::Result<u32, String> {
    let raw = read_trimmed(path).map_err(|e| format!("Failed to read: {}", e))?;
    raw.parse::<u32>()
        .map_err(|e| format!("Failed to parse '{}': {}", raw, e))
}

/// Write a brightness value as decimal text, without trailing newline.
pub fn write_brightness(path: &Path, value: u32) -> Result<()> {
    fs::write(path, value.to_string()).map_err(|e| SyncError::DeviceWrite {
        path: path.to_path_buf(),
        reason: format!("Failed to write value {}: {}", value, e),
    })
}

/// Where to write one external device and how far its scale goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    write_target: PathBuf,
    max_value: u32,
}

impl DeviceHandle {
    pub fn new(write_target: PathBuf, max_value: u32) -> Self {
        Self { write_target, max_value }
    }

    pub fn write_target(&self) -> &Path {
        &self.write_target
    }

    pub fn max_value(&self) -> u32 {
        self.max_value
    }
}

/// One registry snapshot: device id -> handle, in enumeration order.
///
/// Order only drives the "Screen N" numbering in status output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Devices {
    entries: Vec<(String, DeviceHandle)>,
}

impl Devices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device. A repeated id replaces the earlier handle in place.
    pub fn insert(&mut self, id: impl Into<String>, handle: DeviceHandle) {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = handle,
            None => self.entries.push((id, handle)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&DeviceHandle> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, h)| h)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceHandle)> {
        self.entries.iter().map(|(k, h)| (k.as_str(), h))
    }
}

/// Discovers external backlight devices under a class directory.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    base_dir: PathBuf,
    source_id: String,
}

impl DeviceRegistry {
    pub fn new(base_dir: impl Into<PathBuf>, source_id: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source_id: source_id.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// List device ids under the base directory, minus the source panel.
    ///
    /// Ids are sorted by name so screen numbering is stable between runs.
    pub fn discover(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_dir).map_err(|source| SyncError::Enumeration {
            path: self.base_dir.clone(),
            source,
        })?;

        let mut ids: Vec<String> = entries
            .flatten()
            .map(|ent| ent.file_name().to_string_lossy().into_owned())
            .filter(|name| *name != self.source_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Read the device's maximum brightness and bind it to its write target.
    pub fn build_handle(&self, id: &str) -> Result<DeviceHandle> {
        let dir = self.base_dir.join(id);
        let max_path = dir.join(MAX_BRIGHTNESS);
        let max_value = read_value(&max_path).map_err(|reason| SyncError::DeviceRead {
            path: max_path.clone(),
            reason,
        })?;
        if max_value == 0 {
            return Err(SyncError::DeviceRead {
                path: max_path,
                reason: "maximum brightness is zero".into(),
            });
        }
        Ok(DeviceHandle::new(dir.join(BRIGHTNESS), max_value))
    }

    /// Build a fresh snapshot. Devices whose settings cannot be read are
    /// left out; only a failure to list the base directory is an error.
    pub fn refresh(&self) -> Result<Devices> {
        let mut devices = Devices::new();
        for id in self.discover()? {
            match self.build_handle(&id) {
                Ok(handle) => {
                    debug!("Device {}: max brightness {}", id, handle.max_value());
                    devices.insert(id, handle);
                }
                Err(e) => warn!("Skipping device {}: {}", id, e),
            }
        }
        Ok(devices)
    }
}

/// Reads the built-in panel's brightness as a ratio.
#[derive(Debug, Clone)]
pub struct SourceSensor {
    max_path: PathBuf,
    actual_path: PathBuf,
}

impl SourceSensor {
    pub fn new(source_dir: impl AsRef<Path>) -> Self {
        let dir = source_dir.as_ref();
        Self {
            max_path: dir.join(MAX_BRIGHTNESS),
            actual_path: dir.join(ACTUAL_BRIGHTNESS),
        }
    }

    /// Current brightness as `actual / max`, clamped to [0, 1].
    pub fn read(&self) -> Result<f64> {
        let max = read_value(&self.max_path).map_err(|reason| SyncError::SourceRead {
            path: self.max_path.clone(),
            reason,
        })?;
        let actual = read_value(&self.actual_path).map_err(|reason| SyncError::SourceRead {
            path: self.actual_path.clone(),
            reason,
        })?;
        if max == 0 {
            return Err(SyncError::SourceRead {
                path: self.max_path.clone(),
                reason: "maximum brightness is zero".into(),
            });
        }
        Ok((actual as f64 / max as f64).clamp(0.0, 1.0))
    }
}
