// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Video timing profiles.
//!
//! A [`TimingProfile`] describes one fixed timing standard: per axis, the
//! visible interval, front porch, sync pulse width and back porch, all in
//! pixel-clock units (columns) for the horizontal axis and scan lines for
//! the vertical axis. The default profile is 640x480@60
//! (<http://www.tinyvga.com/vga-timing/640x480@60Hz>).

use serde::Deserialize;

/// Electrical polarity of a sync pulse.
///
/// The detector machinery always works on asserted/deasserted levels;
/// polarity is applied once at the sampling boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolarity {
    ActiveHigh,
    ActiveLow,
}

impl SyncPolarity {
    /// Whether a raw signal level counts as an asserted sync pulse.
    pub fn is_asserted(self, level: bool) -> bool {
        match self {
            SyncPolarity::ActiveHigh => level,
            SyncPolarity::ActiveLow => !level,
        }
    }

    /// The raw signal level that represents the given assertion state.
    pub fn level_for(self, asserted: bool) -> bool {
        match self {
            SyncPolarity::ActiveHigh => asserted,
            SyncPolarity::ActiveLow => !asserted,
        }
    }
}

/// Timing intervals for one axis. The sum of the four intervals is the
/// total period (columns per line, or lines per frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AxisTiming {
    /// Interval during which sampled pixel data is valid.
    pub visible: u32,
    /// Idle interval between the visible area and the sync pulse.
    pub front_porch: u32,
    /// Width of the sync pulse.
    pub sync_width: u32,
    /// Idle interval between the sync pulse and the next visible area.
    pub back_porch: u32,
    /// Polarity of the sync pulse on this axis.
    pub polarity: SyncPolarity,
}

impl AxisTiming {
    /// Total period length of this axis.
    pub fn total(&self) -> u32 {
        self.visible + self.front_porch + self.sync_width + self.back_porch
    }
}

impl Default for AxisTiming {
    fn default() -> Self {
        TimingProfile::vga_640x480().horizontal
    }
}

/// A complete timing standard: both axes plus the color channel scaling
/// multiplier. Configured once, read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingProfile {
    pub horizontal: AxisTiming,
    pub vertical: AxisTiming,
    /// Multiplier from a module's small-integer channel value to an 8-bit
    /// color channel.
    pub channel_scale: u32,
}

impl TimingProfile {
    /// The 640x480@60 VGA profile the reference hardware targets.
    pub fn vga_640x480() -> Self {
        TimingProfile {
            horizontal: AxisTiming {
                visible: 640,
                front_porch: 16,
                sync_width: 96,
                back_porch: 48,
                polarity: SyncPolarity::ActiveHigh,
            },
            vertical: AxisTiming {
                visible: 480,
                front_porch: 10,
                sync_width: 2,
                back_porch: 33,
                polarity: SyncPolarity::ActiveHigh,
            },
            channel_scale: 16,
        }
    }

    /// Upper bound on edge iterations for unsynchronized pulse searches.
    ///
    /// Five nominal frames worth of edges. A generous safety cap, not a
    /// protocol constant.
    pub fn sync_search_cap(&self) -> u32 {
        self.horizontal
            .total()
            .saturating_mul(self.vertical.total())
            .saturating_mul(5)
    }

    /// Check that the profile describes a sweepable standard.
    pub fn validate(&self) -> Result<(), String> {
        for (name, axis) in [("horizontal", &self.horizontal), ("vertical", &self.vertical)] {
            if axis.visible == 0 {
                return Err(format!("{} visible area must be nonzero", name));
            }
            if axis.sync_width == 0 {
                return Err(format!("{} sync pulse width must be nonzero", name));
            }
        }
        Ok(())
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        TimingProfile::vga_640x480()
    }
}
