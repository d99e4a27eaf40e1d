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

//! backlight-sync - keep external monitors at the built-in panel's brightness
//!
//! Watches the laptop panel through sysfs backlight and writes a calibrated
//! value to every ddcci backlight device whenever it changes, reloading the
//! ddcci driver when monitors disappear or stop accepting writes.

pub mod error;
pub mod backlight;
pub mod calibration;
pub mod recovery;
pub mod sync;
pub mod config;
pub mod logger;

pub use error::{Result, SyncError};

#[cfg(test)]
pub mod test_utils;
