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

//! Brightness calibration curves
//!
//! OLED panels stay visible far below the point where an external LCD goes
//! dark, so the low end of the source range is a dead zone: anything at or
//! below the threshold turns the external display fully down, and the rest of
//! the range is stretched linearly so the top still reaches the device maximum.
//!
//! Two parameterizations exist in the field and they disagree, so the curve
//! is a strategy picked at startup rather than a fixed formula.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 0.35;
pub const DEFAULT_ABSOLUTE_THRESHOLD: u32 = 25;
/// 4/3 stretches raw 25..=100 onto 0..=100.
pub const DEFAULT_ABSOLUTE_RESCALE: (u32, u32) = (4, 3);

/// Maps a normalized source brightness onto one device's integer scale.
///
/// Implementations must be pure and monotonic non-decreasing in `normalized`
/// for a fixed `device_max`, and return a value in `0..=device_max`.
pub trait BrightnessCurve: Send + Sync + fmt::Debug {
    fn map(&self, normalized: f64, device_max: u32) -> u32;
}

/// Source value on the device scale, floored and clamped to `device_max`.
fn raw_value(normalized: f64, device_max: u32) -> u32 {
    let n = if normalized.is_nan() { 0.0 } else { normalized.clamp(0.0, 1.0) };
    let raw = (n * device_max as f64).floor() as u32;
    raw.min(device_max)
}

/// Dead zone expressed as a fraction of each device's maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeDeadZone {
    threshold: f64,
}

impl RelativeDeadZone {
    /// `threshold` is clamped to [0, 1).
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_nan() { 0.0 } else { threshold.clamp(0.0, 0.999) };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for RelativeDeadZone {
    fn default() -> Self {
        Self::new(DEFAULT_RELATIVE_THRESHOLD)
    }
}

impl BrightnessCurve for RelativeDeadZone {
    fn map(&self, normalized: f64, device_max: u32) -> u32 {
        let raw = raw_value(normalized, device_max);
        let cutoff = self.threshold * device_max as f64;
        if raw as f64 <= cutoff {
            return 0;
        }
        if raw >= device_max {
            return device_max;
        }
        let max = device_max as f64;
        let scale = max / (max - cutoff);
        let scaled = ((raw as f64 - cutoff) * scale).floor();
        scaled.clamp(0.0, max) as u32
    }
}

/// Dead zone expressed in raw device units with a fixed rescale ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteDeadZone {
    threshold: u32,
    rescale_num: u32,
    rescale_den: u32,
}

impl AbsoluteDeadZone {
    /// A zero denominator is treated as a 1:1 rescale.
    pub fn new(threshold: u32, rescale_num: u32, rescale_den: u32) -> Self {
        let (rescale_num, rescale_den) = if rescale_den == 0 { (1, 1) } else { (rescale_num, rescale_den) };
        Self { threshold, rescale_num, rescale_den }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for AbsoluteDeadZone {
    fn default() -> Self {
        let (num, den) = DEFAULT_ABSOLUTE_RESCALE;
        Self::new(DEFAULT_ABSOLUTE_THRESHOLD, num, den)
    }
}

impl BrightnessCurve for AbsoluteDeadZone {
    fn map(&self, normalized: f64, device_max: u32) -> u32 {
        let raw = raw_value(normalized, device_max);
        if raw <= self.threshold {
            return 0;
        }
        if raw >= device_max {
            return device_max;
        }
        let scaled = (raw - self.threshold) as u64 * self.rescale_num as u64 / self.rescale_den as u64;
        scaled.min(device_max as u64) as u32
    }
}

/// Curve selection for the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CurveProfile {
    /// 35% dead zone relative to each device, proportional stretch
    #[default]
    Relative,
    /// 25-unit dead zone, 4/3 stretch
    Absolute,
}

impl CurveProfile {
    pub fn build(self) -> Box<dyn BrightnessCurve> {
        match self {
            Self::Relative => Box::new(RelativeDeadZone::default()),
            Self::Absolute => Box::new(AbsoluteDeadZone::default()),
        }
    }
}

impl fmt::Display for CurveProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relative => write!(f, "relative"),
            Self::Absolute => write!(f, "absolute"),
        }
    }
}
