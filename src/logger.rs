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

//! Optional JSON-lines event log. Every call is a no-op until [`init_event_log`] succeeds.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Open `path` for appending, creating parent directories as needed.
pub fn init_event_log(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = OpenOptions::new().create(true).append(true).open(path)?;
    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = Some(f),
        Err(poisoned) => *poisoned.into_inner() = Some(f),
    }
    Ok(())
}

pub fn close_event_log() {
    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
}

pub fn log_event(event: &str, data: Value) {
    let Ok(mut guard) = LOG_FILE.lock() else { return };
    let Some(f) = guard.as_mut() else { return };
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();
    let _ = writeln!(f, "{}", line);
}
