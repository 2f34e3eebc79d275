// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! raster: a multi-clock discrete-event scheduler paired with a VGA frame
//! timing verifier for simulated RTL modules.
//!
//! The scheduler ([`clock::ClockScheduler`]) drives independently-clocked
//! modules in lockstep by always advancing simulation time by the minimum
//! time-to-next-edge across all registered clock domains. The verifier
//! ([`verifier::FrameVerifier`]) sweeps a VGA driver module column by column
//! and row by row, validates its sync pulse timing against a
//! [`timing::TimingProfile`], and forwards visible pixels to a caller-supplied
//! draw sink.
//!
//! Typical usage:
//!
//! ```ignore
//! let mut scheduler = ClockScheduler::new();
//! let gpu = scheduler.add_domain("pixel", PatternGenerator::new(&profile), 1, 0, true)?;
//! let mut verifier = FrameVerifier::new(&mut scheduler, gpu, profile);
//! verifier.sync()?;
//! verifier.process_frame(&mut |x, y, color| framebuffer.set(x, y, color))?;
//! ```

pub mod clock;
pub mod config;
pub mod detect;
pub mod testbench;
pub mod timing;
pub mod verifier;
