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

//! Polling loop
//!
//! One thread, one cycle at a time: read the panel, compare with the last
//! value that was fully applied, and if it moved write the calibrated value
//! to every external device in enumeration order. The first failed write
//! ends the cycle and sends the engine through driver recovery; the last
//! applied brightness is left alone so the next cycle tries again.

use std::convert::Infallible;
use std::thread;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::backlight::{write_brightness, DeviceRegistry, Devices, SourceSensor};
use crate::calibration::BrightnessCurve;
use crate::error::{Result, SyncError};
use crate::logger;
use crate::recovery::RecoveryManager;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    pub interval: Duration,
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Polling,
    Writing,
    Recovering,
}

/// Everything that changes between cycles. Passed by value through [`SyncEngine::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub devices: Devices,
    /// Last source ratio whose writes all succeeded; `None` until the first one.
    pub last_brightness: Option<f64>,
    pub phase: Phase,
}

impl EngineState {
    pub fn new() -> Self {
        Self { devices: Devices::new(), last_brightness: None, phase: Phase::Init }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Source brightness equal to the last applied value; nothing written.
    Unchanged,
    /// Every device received its value.
    Written { brightness: f64, values: Vec<(String, u32)> },
    /// A write failed and the registry was rebuilt after a driver reload.
    Recovered { failed_device: String, devices: usize },
}

struct WriteFailure {
    device: String,
    error: SyncError,
}

pub struct SyncEngine {
    registry: DeviceRegistry,
    sensor: SourceSensor,
    curve: Box<dyn BrightnessCurve>,
    recovery: RecoveryManager,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        registry: DeviceRegistry,
        sensor: SourceSensor,
        curve: Box<dyn BrightnessCurve>,
        recovery: RecoveryManager,
        settings: SyncSettings,
    ) -> Self {
        Self { registry, sensor, curve, recovery, settings }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Seed the registry. Fails only if the device class directory is unreadable.
    pub fn init(&self) -> Result<EngineState> {
        let devices = self.registry.refresh()?;
        info!(
            "Found {} external device(s): {}",
            devices.len(),
            devices.ids().collect::<Vec<_>>().join(", ")
        );
        Ok(EngineState { devices, last_brightness: None, phase: Phase::Polling })
    }

    /// Run one poll cycle.
    ///
    /// Returns an error only for fatal conditions (see [`SyncError::is_fatal`]).
    pub fn tick(&self, mut state: EngineState) -> Result<(EngineState, TickOutcome)> {
        state.phase = Phase::Polling;
        let brightness = self.sensor.read()?;

        // exact comparison: the ratio comes from the same two integers every time
        if state.last_brightness == Some(brightness) {
            return Ok((state, TickOutcome::Unchanged));
        }

        if state.devices.is_empty() {
            debug!("No external devices known, recovering before write");
            state.phase = Phase::Recovering;
            state.devices = self.recovery.recover(&self.registry)?;
        }

        state.phase = Phase::Writing;
        match self.write_all(&state.devices, brightness) {
            Ok(values) => {
                state.last_brightness = Some(brightness);
                state.phase = Phase::Polling;
                let line = status_line(brightness, &values);
                debug!("{}", line);
                if !self.settings.quiet {
                    println!("{}", line);
                }
                Ok((state, TickOutcome::Written { brightness, values }))
            }
            Err(failure) => {
                warn!("{}; reloading display driver", failure.error);
                state.phase = Phase::Recovering;
                state.devices = self.recovery.recover(&self.registry)?;
                state.phase = Phase::Polling;
                let devices = state.devices.len();
                Ok((state, TickOutcome::Recovered { failed_device: failure.device, devices }))
            }
        }
    }

    /// Write to each device in order, stopping at the first failure.
    fn write_all(&self, devices: &Devices, brightness: f64) -> std::result::Result<Vec<(String, u32)>, WriteFailure> {
        let mut values = Vec::with_capacity(devices.len());
        for (id, handle) in devices.iter() {
            let value = self.curve.map(brightness, handle.max_value());
            if let Err(error) = write_brightness(handle.write_target(), value) {
                return Err(WriteFailure { device: id.to_string(), error });
            }
            logger::log_event(
                "brightness_write",
                json!({ "device": id, "source": brightness, "value": value }),
            );
            values.push((id.to_string(), value));
        }
        Ok(values)
    }

    /// Seed, then poll forever. Returns only on a fatal error.
    pub fn sync(&self) -> Result<Infallible> {
        info!("Start syncing (interval {:?})", self.settings.interval);
        let mut state = self.init()?;
        loop {
            let (next, outcome) = self.tick(state)?;
            if let TickOutcome::Recovered { failed_device, devices } = &outcome {
                debug!("Recovery after {} failed left {} device(s)", failed_device, devices);
            }
            state = next;
            thread::sleep(self.settings.interval);
        }
    }
}

/// One-line summary, e.g. `New brightness: 49% | Screen 0: 21`.
pub fn status_line(brightness: f64, values: &[(String, u32)]) -> String {
    let mut out = format!("New brightness: {}%", (brightness * 100.0) as u32);
    for (i, (_, value)) in values.iter().enumerate() {
        out.push_str(&format!(" | Screen {}: {}", i, value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{AbsoluteDeadZone, RelativeDeadZone};
    use crate::recovery::MockDriverReloader;
    use crate::test_utils::test_utils::{
        add_device, break_device, create_mock_backlight_dir, read_brightness, set_source,
    };
    use std::path::{Path, PathBuf};

    fn engine(base: &Path, reloader: MockDriverReloader) -> SyncEngine {
        SyncEngine::new(
            DeviceRegistry::new(base, "intel_backlight"),
            SourceSensor::new(base.join("intel_backlight")),
            Box::new(RelativeDeadZone::default()),
            RecoveryManager::new(Box::new(reloader)),
            SyncSettings { interval: Duration::from_millis(1), quiet: true },
        )
    }

    fn no_reload() -> MockDriverReloader {
        let mut r = MockDriverReloader::new();
        r.expect_reload().times(0);
        r
    }

    #[test]
    fn test_init_seeds_registry() {
        let dir = create_mock_backlight_dir(&[("ddcci1", 100), ("ddcci2", 255)]);
        let state = engine(dir.path(), no_reload()).init().unwrap();
        assert_eq!(state.devices.len(), 2);
        assert_eq!(state.last_brightness, None);
        assert_eq!(state.phase, Phase::Polling);
    }

    #[test]
    fn test_init_fails_without_class_dir() {
        let dir = create_mock_backlight_dir(&[]);
        let e = engine(&dir.path().join("missing"), no_reload());
        assert!(matches!(e.init(), Err(SyncError::Enumeration { .. })));
    }

    #[test]
    fn test_first_tick_writes_calibrated_value() {
        let dir = create_mock_backlight_dir(&[("ddcci1", 100)]);
        set_source(dir.path(), 127, 255);
        let e = engine(dir.path(), no_reload());

        let (state, outcome) = e.tick(e.init().unwrap()).unwrap();
        assert_eq!(read_brightness(dir.path(), "ddcci1"), "21");
        assert_eq!(state.last_brightness, Some(127.0 / 255.0));
        match outcome {
            TickOutcome::Written { values, .. } => assert_eq!(values, vec![("ddcci1".to_string(), 21)]),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_source_writes_nothing() {
        let dir = create_mock_backlight_dir(&[("ddcci1", 100)]);
        set_source(dir.path(), 200, 255);
        let e = engine(dir.path(), no_reload());

        let (state, _) = e.tick(e.init().unwrap()).unwrap();
        std::fs::write(dir.path().join("ddcci1").join("brightness"), "sentinel").unwrap();

        let (state, outcome) = e.tick(state).unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged);
        assert_eq!(read_brightness(dir.path(), "ddcci1"), "sentinel");

        set_source(dir.path(), 255, 255);
        let (_, outcome) = e.tick(state).unwrap();
        assert!(matches!(outcome, TickOutcome::Written { .. }));
        assert_eq!(read_brightness(dir.path(), "ddcci1"), "100");
    }

    #[test]
    fn test_empty_registry_recovers_before_writing() {
        let dir = create_mock_backlight_dir(&[]);
        set_source(dir.path(), 255, 255);
        let base: PathBuf = dir.path().to_path_buf();

        // the device only appears once the driver is reloaded
        let mut reloader = MockDriverReloader::new();
        let base_for_reload = base.clone();
        reloader.expect_reload().times(1).returning(move || {
            add_device(&base_for_reload, "ddcci4", 50);
            Ok(())
        });
        let e = engine(&base, reloader);

        let state = e.init().unwrap();
        assert!(state.devices.is_empty());

        let (state, outcome) = e.tick(state).unwrap();
        assert!(matches!(outcome, TickOutcome::Written { .. }));
        assert_eq!(read_brightness(&base, "ddcci4"), "50");
        assert!(state.devices.contains("ddcci4"));
    }

    #[test]
    fn test_write_failure_aborts_remaining_devices() {
        let dir = create_mock_backlight_dir(&[("a", 100), ("b", 100), ("c", 100)]);
        set_source(dir.path(), 255, 255);
        for id in ["a", "c"] {
            std::fs::write(dir.path().join(id).join("brightness"), "untouched").unwrap();
        }

        let mut reloader = MockDriverReloader::new();
        reloader.expect_reload().times(1).returning(|| Ok(()));
        let e = engine(dir.path(), reloader);
        let state = e.init().unwrap();
        break_device(dir.path(), "b");

        let (state, outcome) = e.tick(state).unwrap();
        assert_eq!(read_brightness(dir.path(), "a"), "100");
        assert_eq!(read_brightness(dir.path(), "c"), "untouched");
        assert_eq!(
            outcome,
            TickOutcome::Recovered { failed_device: "b".to_string(), devices: 2 }
        );
        assert_eq!(state.last_brightness, None);
        assert_eq!(state.phase, Phase::Polling);
    }

    #[test]
    fn test_recovery_keeps_last_brightness_so_next_tick_retries() {
        let dir = create_mock_backlight_dir(&[("a", 100)]);
        set_source(dir.path(), 255, 255);

        let mut reloader = MockDriverReloader::new();
        reloader.expect_reload().times(1).returning(|| Ok(()));
        let e = engine(dir.path(), reloader);

        let (state, _) = e.tick(e.init().unwrap()).unwrap();
        assert_eq!(state.last_brightness, Some(1.0));

        add_device(dir.path(), "b", 100);
        let mut state = state;
        state.devices = e.registry.refresh().unwrap();
        break_device(dir.path(), "b");
        set_source(dir.path(), 100, 255);

        let (state, outcome) = e.tick(state).unwrap();
        assert!(matches!(outcome, TickOutcome::Recovered { .. }));
        assert_eq!(state.last_brightness, Some(1.0));
        assert_eq!(state.devices.ids().collect::<Vec<_>>(), vec!["a"]);

        // same source value again is still a change relative to the stored one
        let (_, outcome) = e.tick(state).unwrap();
        assert!(matches!(outcome, TickOutcome::Written { .. }));
        assert_eq!(read_brightness(dir.path(), "a"), "6");
    }

    #[test]
    fn test_source_read_error_is_fatal() {
        let dir = create_mock_backlight_dir(&[("a", 100)]);
        let e = engine(dir.path(), no_reload());
        let state = e.init().unwrap();
        std::fs::remove_dir_all(dir.path().join("intel_backlight")).unwrap();

        let err = e.tick(state).unwrap_err();
        assert!(matches!(err, SyncError::SourceRead { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_curve_is_injected() {
        let dir = create_mock_backlight_dir(&[("ddcci1", 100)]);
        set_source(dir.path(), 50, 100);
        let e = SyncEngine::new(
            DeviceRegistry::new(dir.path(), "intel_backlight"),
            SourceSensor::new(dir.path().join("intel_backlight")),
            Box::new(AbsoluteDeadZone::default()),
            RecoveryManager::new(Box::new(no_reload())),
            SyncSettings { interval: Duration::from_millis(1), quiet: true },
        );
        e.tick(e.init().unwrap()).unwrap();
        assert_eq!(read_brightness(dir.path(), "ddcci1"), "33");
    }

    #[test]
    fn test_status_line() {
        let values = vec![("ddcci1".to_string(), 21), ("ddcci2".to_string(), 54)];
        assert_eq!(
            status_line(127.0 / 255.0, &values),
            "New brightness: 49% | Screen 0: 21 | Screen 1: 54"
        );
        assert_eq!(status_line(0.0, &[]), "New brightness: 0%");
    }
}
