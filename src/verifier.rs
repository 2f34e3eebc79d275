// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! VGA frame timing verification.
//!
//! The [`FrameVerifier`] drives a [`VgaDriver`] module through the
//! [`ClockScheduler`](crate::clock::ClockScheduler), one scheduler edge per
//! column, and checks the observed sync pulse pattern of every row and frame
//! against a [`TimingProfile`]. Visible pixels are forwarded to a
//! caller-supplied draw sink, at most once per pixel per frame, strictly in
//! row-major order, never outside the declared visible area.
//!
//! Call [`FrameVerifier::sync`] once to phase-align the module, then
//! [`FrameVerifier::process_frame`] per frame.

use thiserror::Error;

use crate::clock::{ClockScheduler, ClockedModule, ModuleHandle};
use crate::detect::SyncPulseDetector;
use crate::timing::TimingProfile;

// ---------------------------------------------------------------------------
// Driver contract
// ---------------------------------------------------------------------------

/// A clocked module that exposes VGA signal outputs.
///
/// Sync levels are raw electrical levels; the verifier normalizes them
/// through the profile's polarity. Color channels are small integers that
/// the verifier scales into 8-bit color.
pub trait VgaDriver: ClockedModule {
    fn hsync(&self) -> bool;
    fn vsync(&self) -> bool;
    fn red(&self) -> u8;
    fn green(&self) -> u8;
    fn blue(&self) -> u8;
}

/// An 8-bit RGBA color sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Scale a driver's small-integer channels into an opaque 8-bit color.
    pub fn from_channels(r: u8, g: u8, b: u8, scale: u32) -> Self {
        let scaled = |ch: u8| (u32::from(ch) * scale).min(255) as u8;
        Rgba { r: scaled(r), g: scaled(g), b: scaled(b), a: 255 }
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// The sync line a timing error was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Axis::Horizontal => "hsync",
            Axis::Vertical => "vsync",
        })
    }
}

/// A frame timing verification failure.
///
/// Positions and widths are in columns for [`Axis::Horizontal`] and rows
/// for [`Axis::Vertical`]. Every failure is a returned value; the caller
/// decides whether to log and continue or abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VgaError {
    /// No sync pulse was observed over the whole sweep.
    #[error("{axis} undetected")]
    SyncUndetected { axis: Axis },
    /// More than one sync pulse was observed in one sweep.
    #[error("multiple {axis} pulses detected")]
    MultiplePulsesDetected { axis: Axis },
    /// The sync pulse closed with the wrong width (or ran off the end of
    /// the sweep, in which case `actual` is the truncated width).
    #[error("incorrect {axis} pulse width, expected {expected}, found {actual}")]
    IncorrectPulseWidth { axis: Axis, expected: u32, actual: u32 },
    /// The sync pulse started at the wrong position.
    #[error("{axis} expected on position {expected}, found on {actual}")]
    IncorrectSyncTiming { axis: Axis, expected: u32, actual: u32 },
    /// A row sweep failed while crossing the vertical back porch; the
    /// underlying cause has already been logged.
    #[error("incorrect row timing on row {row}")]
    IncorrectRowTiming { row: u32 },
}

/// Validate one closed sweep against the expected pulse geometry, in fixed
/// order: presence, multiplicity, width, then position. `horizon` is the
/// sweep length, used to report a truncated width for a pulse that never
/// closed.
fn check_pulse(
    det: &SyncPulseDetector,
    axis: Axis,
    expected_width: u32,
    expected_start: Option<u32>,
    horizon: u32,
) -> Result<(), VgaError> {
    if !det.pulse_seen() {
        return Err(VgaError::SyncUndetected { axis });
    }
    if det.multiple_pulses() {
        return Err(VgaError::MultiplePulsesDetected { axis });
    }
    let actual = det
        .pulse_width()
        .unwrap_or_else(|| horizon.saturating_sub(det.start()));
    if actual != expected_width {
        return Err(VgaError::IncorrectPulseWidth { axis, expected: expected_width, actual });
    }
    if let Some(expected) = expected_start {
        if det.start() != expected {
            return Err(VgaError::IncorrectSyncTiming { axis, expected, actual: det.start() });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Frame verifier
// ---------------------------------------------------------------------------

/// Sweeps a VGA driver module and validates its sync timing.
///
/// Borrows the scheduler for its lifetime; the driver module is reached
/// through its registration handle. A position mismatch of a sync pulse is
/// a hard failure: the affected sweep is rejected, not soft-logged.
pub struct FrameVerifier<'a, D> {
    scheduler: &'a mut ClockScheduler,
    driver: ModuleHandle<D>,
    profile: TimingProfile,
    row: u32,
}

impl<'a, D: VgaDriver> FrameVerifier<'a, D> {
    pub fn new(
        scheduler: &'a mut ClockScheduler,
        driver: ModuleHandle<D>,
        profile: TimingProfile,
    ) -> Self {
        FrameVerifier { scheduler, driver, profile, row: 0 }
    }

    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    /// Sweep one complete horizontal line: one scheduler edge per column,
    /// feeding the hsync level into a fresh detector. If `visible_row`,
    /// every column inside the visible width is sampled and forwarded to
    /// `draw` exactly once.
    ///
    /// The expected pulse start is `visible + front_porch - 1`: the sweep
    /// observes the module one edge after it is clocked, so the pulse
    /// lands one column ahead of its nominal offset.
    pub fn process_row<F>(&mut self, draw: &mut F, visible_row: bool) -> Result<(), VgaError>
    where
        F: FnMut(u32, u32, Rgba),
    {
        let h = self.profile.horizontal;
        let mut det = SyncPulseDetector::new();
        for col in 0..h.total() {
            self.scheduler.advance();
            let driver = self.scheduler.module(self.driver);
            det.observe(h.polarity.is_asserted(driver.hsync()), col);
            if visible_row && col < h.visible {
                let color = Rgba::from_channels(
                    driver.red(),
                    driver.green(),
                    driver.blue(),
                    self.profile.channel_scale,
                );
                draw(col, self.row, color);
            }
        }
        check_pulse(
            &det,
            Axis::Horizontal,
            h.sync_width,
            Some(h.visible + h.front_porch - 1),
            h.total(),
        )
    }

    /// Sweep one complete frame, forwarding visible pixels to `draw`.
    ///
    /// Assumes the module is phase-aligned (run [`sync`](Self::sync)
    /// first). Sweeps rows 0 through the vertical total inclusive, feeding
    /// the vsync level into a frame-scoped detector keyed by row index. A
    /// failing row aborts the frame and its error propagates verbatim.
    pub fn process_frame<F>(&mut self, draw: &mut F) -> Result<(), VgaError>
    where
        F: FnMut(u32, u32, Rgba),
    {
        let v = self.profile.vertical;
        self.row = 0;
        let mut det = SyncPulseDetector::new();
        while self.row <= v.total() {
            let visible_row = self.row < v.visible;
            self.process_row(draw, visible_row)?;
            let level = v.polarity.is_asserted(self.scheduler.module(self.driver).vsync());
            det.observe(level, self.row);
            self.row += 1;
        }
        check_pulse(
            &det,
            Axis::Vertical,
            v.sync_width,
            Some(v.visible + v.front_porch),
            v.total() + 1,
        )
    }

    /// Establish phase alignment so a subsequent
    /// [`process_frame`](Self::process_frame) starts exactly at the
    /// beginning of the visible area.
    ///
    /// Bounded by `TimingProfile::sync_search_cap()` iterations per search.
    /// Stages: find one full horizontal pulse edge-by-edge, cross the
    /// horizontal back porch, find one full vertical pulse row-by-row with
    /// pixel output discarded, then cross the vertical back porch. Succeeds
    /// only if all four stages complete without anomaly.
    pub fn sync(&mut self) -> Result<(), VgaError> {
        let h = self.profile.horizontal;
        let v = self.profile.vertical;
        let cap = self.profile.sync_search_cap();
        self.row = 0;

        // (a) One full horizontal pulse. Positions here are edge indices,
        // not columns, so the pulse position is not checked.
        let mut hdet = SyncPulseDetector::new();
        for i in 0..cap {
            self.scheduler.advance();
            let level = h.polarity.is_asserted(self.scheduler.module(self.driver).hsync());
            if hdet.observe(level, i) && !hdet.in_pulse() {
                break;
            }
        }
        check_pulse(&hdet, Axis::Horizontal, h.sync_width, None, cap)?;

        // (b) Cross the back porch to the first visible column.
        for _ in 0..h.back_porch {
            self.scheduler.advance();
        }

        // (c) One full vertical pulse, sweeping whole rows. Every row's
        // horizontal timing must already hold here.
        let mut discard = |_x: u32, _y: u32, _color: Rgba| {};
        let mut vdet = SyncPulseDetector::new();
        let mut row = 0;
        while row < cap {
            self.process_row(&mut discard, false)?;
            let level = v.polarity.is_asserted(self.scheduler.module(self.driver).vsync());
            if vdet.observe(level, row) && !vdet.in_pulse() {
                break;
            }
            row += 1;
        }
        check_pulse(&vdet, Axis::Vertical, v.sync_width, None, row)?;

        // (d) Cross the vertical back porch to the first visible row.
        for _ in 0..v.back_porch {
            row += 1;
            if let Err(err) = self.process_row(&mut discard, false) {
                clilog::warn!("row sweep failed in the vertical back porch: {}", err);
                return Err(VgaError::IncorrectRowTiming { row });
            }
        }
        Ok(())
    }
}
