// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Testbench device models and fault injection.
//!
//! [`PatternGenerator`] is a synchronous VGA signal source built from
//! free-running column/row counters, used by the `vga_check` harness and
//! the verifier tests in place of a real Verilated graphics unit.
//! [`TestbenchConfig`] is the JSON testbench description consumed by the
//! harness; its [`FaultSpec`] knobs distort the generated signal so every
//! verifier error kind can be exercised on demand.

use std::path::Path;

use serde::Deserialize;

use crate::clock::ClockedModule;
use crate::timing::{SyncPolarity, TimingProfile};
use crate::verifier::VgaDriver;

/// Testbench description for the `vga_check` harness.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestbenchConfig {
    /// Number of frames to verify. CLI `--frames` overrides this.
    pub frames: Option<usize>,
    /// Signal faults to inject into the pattern generator.
    pub faults: FaultSpec,
}

impl TestbenchConfig {
    /// Load a testbench description from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let file = std::fs::File::open(path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }
}

/// Signal distortions applied to the pattern generator.
///
/// Deltas are in columns (horizontal) or rows (vertical) and may be
/// negative. Note that a pure pulse shift is unobservable after phase
/// alignment: `sync()` locks onto whatever phase the pulses actually have.
/// Period deltas, by contrast, cause drift the verifier reports as
/// incorrect sync timing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct FaultSpec {
    pub hsync_shift: i32,
    pub hsync_width_delta: i32,
    pub vsync_shift: i32,
    pub vsync_width_delta: i32,
    /// Emit a second, narrow hsync pulse in the middle of the back porch.
    pub extra_hsync_pulse: bool,
    pub drop_hsync: bool,
    pub drop_vsync: bool,
    pub line_period_delta: i32,
    pub frame_period_delta: i32,
}

impl FaultSpec {
    pub fn is_clean(&self) -> bool {
        let FaultSpec {
            hsync_shift,
            hsync_width_delta,
            vsync_shift,
            vsync_width_delta,
            extra_hsync_pulse,
            drop_hsync,
            drop_vsync,
            line_period_delta,
            frame_period_delta,
        } = *self;
        hsync_shift == 0
            && hsync_width_delta == 0
            && vsync_shift == 0
            && vsync_width_delta == 0
            && !extra_hsync_pulse
            && !drop_hsync
            && !drop_vsync
            && line_period_delta == 0
            && frame_period_delta == 0
    }
}

fn offset(base: u32, delta: i32) -> u32 {
    base.saturating_add_signed(delta)
}

/// A half-open position interval.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: u32,
    end: u32,
}

impl Window {
    fn contains(&self, position: u32) -> bool {
        position >= self.start && position < self.end
    }
}

/// Synchronous VGA signal source.
///
/// Column and row counters step on each rising clock edge; sync outputs
/// and a color-bar pattern are recomputed from the counters on every
/// evaluation. The row counter runs one row longer than the vertical total
/// so that consecutive full-frame sweeps (vertical total plus one rows)
/// stay frame-aligned.
#[derive(Debug)]
pub struct PatternGenerator {
    line_period: u32,
    frame_period: u32,
    visible_cols: u32,
    h_pulse: Window,
    h_extra: Option<Window>,
    v_pulse: Window,
    h_polarity: SyncPolarity,
    v_polarity: SyncPolarity,
    drop_hsync: bool,
    drop_vsync: bool,

    clock: bool,
    prev_clock: bool,
    col: u32,
    row: u32,
    hsync: bool,
    vsync: bool,
    rgb: (u8, u8, u8),
}

impl PatternGenerator {
    /// A generator that satisfies the given profile.
    pub fn new(profile: &TimingProfile) -> Self {
        PatternGenerator::with_faults(profile, &FaultSpec::default())
    }

    /// A generator with signal faults injected.
    pub fn with_faults(profile: &TimingProfile, faults: &FaultSpec) -> Self {
        let h = profile.horizontal;
        let v = profile.vertical;
        let line_period = offset(h.total(), faults.line_period_delta).max(1);
        let frame_period = offset(v.total() + 1, faults.frame_period_delta).max(1);
        let h_start = offset(h.visible + h.front_porch, faults.hsync_shift);
        let h_pulse = Window {
            start: h_start,
            end: offset(h_start + h.sync_width, faults.hsync_width_delta),
        };
        let v_start = offset(v.visible + v.front_porch, faults.vsync_shift);
        let v_pulse = Window {
            start: v_start,
            end: offset(v_start + v.sync_width, faults.vsync_width_delta),
        };
        let h_extra = faults.extra_hsync_pulse.then(|| {
            let gap = line_period.saturating_sub(h_pulse.end);
            let start = h_pulse.end + gap / 2;
            Window { start, end: (start + (gap / 4).max(1)).min(line_period) }
        });
        let mut generator = PatternGenerator {
            line_period,
            frame_period,
            visible_cols: h.visible,
            h_pulse,
            h_extra,
            v_pulse,
            h_polarity: h.polarity,
            v_polarity: v.polarity,
            drop_hsync: faults.drop_hsync,
            drop_vsync: faults.drop_vsync,
            clock: false,
            prev_clock: false,
            col: 0,
            row: 0,
            hsync: false,
            vsync: false,
            rgb: (0, 0, 0),
        };
        generator.update_outputs();
        generator
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    fn update_outputs(&mut self) {
        let hsync_active = !self.drop_hsync
            && (self.h_pulse.contains(self.col)
                || self.h_extra.is_some_and(|w| w.contains(self.col)));
        self.hsync = self.h_polarity.level_for(hsync_active);
        let vsync_active = !self.drop_vsync && self.v_pulse.contains(self.row);
        self.vsync = self.v_polarity.level_for(vsync_active);
        self.rgb = color_bars(self.col.saturating_sub(1), self.visible_cols);
    }
}

impl ClockedModule for PatternGenerator {
    fn set_clock(&mut self, level: bool) {
        self.clock = level;
    }

    fn eval(&mut self) {
        if self.clock && !self.prev_clock {
            self.col += 1;
            if self.col >= self.line_period {
                self.col = 0;
                self.row += 1;
                if self.row >= self.frame_period {
                    self.row = 0;
                }
            }
        }
        self.prev_clock = self.clock;
        self.update_outputs();
    }
}

impl VgaDriver for PatternGenerator {
    fn hsync(&self) -> bool {
        self.hsync
    }
    fn vsync(&self) -> bool {
        self.vsync
    }
    fn red(&self) -> u8 {
        self.rgb.0
    }
    fn green(&self) -> u8 {
        self.rgb.1
    }
    fn blue(&self) -> u8 {
        self.rgb.2
    }
}

/// Eight full-intensity color bars across the visible width, white first.
fn color_bars(x: u32, visible: u32) -> (u8, u8, u8) {
    if visible == 0 {
        return (0, 0, 0);
    }
    let bar = x.min(visible - 1) * 8 / visible;
    let ch = |bit: u32| if bar & bit == 0 { 15u8 } else { 0 };
    (ch(4), ch(2), ch(1))
}

/// Counts full clock cycles, standing in for a second clocked peripheral
/// in the harness.
#[derive(Debug, Default)]
pub struct CycleCounter {
    clock: bool,
    prev_clock: bool,
    cycles: u64,
}

impl CycleCounter {
    pub fn new() -> Self {
        CycleCounter::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl ClockedModule for CycleCounter {
    fn set_clock(&mut self, level: bool) {
        self.clock = level;
    }

    fn eval(&mut self) {
        if self.clock && !self.prev_clock {
            self.cycles += 1;
        }
        self.prev_clock = self.clock;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockScheduler;
    use crate::timing::AxisTiming;
    use crate::verifier::{Axis, FrameVerifier, VgaError};

    fn tiny() -> TimingProfile {
        TimingProfile {
            horizontal: AxisTiming {
                visible: 4,
                front_porch: 1,
                sync_width: 2,
                back_porch: 1,
                polarity: SyncPolarity::ActiveHigh,
            },
            vertical: AxisTiming {
                visible: 2,
                front_porch: 1,
                sync_width: 1,
                back_porch: 2,
                polarity: SyncPolarity::ActiveHigh,
            },
            channel_scale: 16,
        }
    }

    fn sync_result(profile: TimingProfile, faults: FaultSpec) -> Result<(), VgaError> {
        let mut scheduler = ClockScheduler::new();
        let handle = scheduler
            .add_domain("pixel", PatternGenerator::with_faults(&profile, &faults), 1, 0, true)
            .unwrap();
        let mut verifier = FrameVerifier::new(&mut scheduler, handle, profile);
        verifier.sync()?;
        verifier.process_frame(&mut |_, _, _| {})
    }

    #[test]
    fn test_counters_wrap() {
        let profile = tiny();
        let mut generator = PatternGenerator::new(&profile);
        // Line period 8, frame period 7 (vertical total plus the idle row).
        generator.set_clock(false);
        generator.eval();
        for _ in 0..8 {
            generator.set_clock(true);
            generator.eval();
            generator.set_clock(false);
            generator.eval();
        }
        assert_eq!(generator.col(), 0);
        assert_eq!(generator.row(), 1);
        for _ in 0..8 * 6 {
            generator.set_clock(true);
            generator.eval();
            generator.set_clock(false);
            generator.eval();
        }
        assert_eq!(generator.col(), 0);
        assert_eq!(generator.row(), 0);
    }

    #[test]
    fn test_testbench_config_defaults() {
        let config: TestbenchConfig = serde_json::from_str("{}").unwrap();
        assert!(config.frames.is_none());
        assert!(config.faults.is_clean());

        let config: TestbenchConfig = serde_json::from_str(
            r#"{"frames": 2, "faults": {"hsync_width_delta": -1, "extra_hsync_pulse": true}}"#,
        )
        .unwrap();
        assert_eq!(config.frames, Some(2));
        assert_eq!(config.faults.hsync_width_delta, -1);
        assert!(config.faults.extra_hsync_pulse);
        assert!(!config.faults.is_clean());
    }

    #[test]
    fn test_clean_generator_verifies() {
        sync_result(TimingProfile::vga_640x480(), FaultSpec::default()).unwrap();
    }

    #[test]
    fn test_pulse_shifts_are_absorbed_by_alignment() {
        // Absolute pulse positions are unobservable after sync() locks on;
        // only geometry and drift faults are detectable.
        let faults = FaultSpec { hsync_shift: 2, vsync_shift: 3, ..FaultSpec::default() };
        sync_result(TimingProfile::vga_640x480(), faults).unwrap();
    }

    #[test]
    fn test_narrow_hsync_fault() {
        let faults = FaultSpec { hsync_width_delta: -1, ..FaultSpec::default() };
        assert_eq!(
            sync_result(TimingProfile::vga_640x480(), faults),
            Err(VgaError::IncorrectPulseWidth { axis: Axis::Horizontal, expected: 96, actual: 95 })
        );
    }

    #[test]
    fn test_extra_hsync_pulse_fault() {
        let faults = FaultSpec { extra_hsync_pulse: true, ..FaultSpec::default() };
        assert_eq!(
            sync_result(TimingProfile::vga_640x480(), faults),
            Err(VgaError::MultiplePulsesDetected { axis: Axis::Horizontal })
        );
    }

    #[test]
    fn test_wide_vsync_fault() {
        let faults = FaultSpec { vsync_width_delta: 1, ..FaultSpec::default() };
        assert_eq!(
            sync_result(TimingProfile::vga_640x480(), faults),
            Err(VgaError::IncorrectPulseWidth { axis: Axis::Vertical, expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_line_drift_fault() {
        // One extra column per line: sync() locks on, then every
        // subsequent sweep sees the pulse one column late.
        let faults = FaultSpec { line_period_delta: 1, ..FaultSpec::default() };
        assert_eq!(
            sync_result(TimingProfile::vga_640x480(), faults),
            Err(VgaError::IncorrectSyncTiming { axis: Axis::Horizontal, expected: 655, actual: 656 })
        );
    }

    #[test]
    fn test_frame_drift_fault() {
        let faults = FaultSpec { frame_period_delta: 1, ..FaultSpec::default() };
        assert_eq!(
            sync_result(TimingProfile::vga_640x480(), faults),
            Err(VgaError::IncorrectSyncTiming { axis: Axis::Vertical, expected: 490, actual: 491 })
        );
    }

    #[test]
    fn test_dead_sync_lines() {
        let drop_h = FaultSpec { drop_hsync: true, ..FaultSpec::default() };
        assert_eq!(
            sync_result(tiny(), drop_h),
            Err(VgaError::SyncUndetected { axis: Axis::Horizontal })
        );
        let drop_v = FaultSpec { drop_vsync: true, ..FaultSpec::default() };
        assert_eq!(
            sync_result(tiny(), drop_v),
            Err(VgaError::SyncUndetected { axis: Axis::Vertical })
        );
    }

    #[test]
    fn test_color_bars_span() {
        assert_eq!(color_bars(0, 640), (15, 15, 15));
        assert_eq!(color_bars(639, 640), (0, 0, 0));
        // Bar boundaries step every visible/8 columns.
        assert_eq!(color_bars(80, 640), (15, 15, 0));
    }

    #[test]
    fn test_cycle_counter() {
        let mut scheduler = ClockScheduler::new();
        let counter = scheduler.add_domain("host", CycleCounter::new(), 4, 0, true).unwrap();
        let pixel = scheduler
            .add_domain("pixel", CycleCounter::new(), 1, 0, true)
            .unwrap();
        for _ in 0..12 {
            scheduler.advance();
        }
        assert_eq!(scheduler.module(counter).cycles(), 3);
        assert_eq!(scheduler.module(pixel).cycles(), 12);
    }
}
