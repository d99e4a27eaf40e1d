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

//! Error type shared by every part of the sync engine.
//!
//! Only [`SyncError::Enumeration`] and [`SyncError::SourceRead`] are allowed to
//! terminate the process. Everything else is contained within one poll cycle.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    // ============================================================================
    // Fatal
    // ============================================================================
    #[error("Failed to enumerate backlight devices in {path}: {source}")]
    Enumeration {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to read source panel brightness from {path}: {reason}")]
    SourceRead {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Recovered within one cycle
    // ============================================================================
    #[error("Failed to read device setting from {path}: {reason}")]
    DeviceRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write brightness to {path}: {reason}")]
    DeviceWrite {
        path: PathBuf,
        reason: String,
    },

    #[error("Driver reload failed: {0}")]
    DriverReload(String),

    #[error("Driver reload of {module} timed out after {timeout:?}")]
    RecoveryTimeout {
        module: String,
        timeout: Duration,
    },

    // ============================================================================
    // Startup
    // ============================================================================
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl SyncError {
    /// Whether this error must stop the polling loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Enumeration { .. } | Self::SourceRead { .. })
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
