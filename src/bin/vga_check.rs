// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! VGA timing verification harness.
//!
//! Drives a pattern-generator signal source (optionally distorted by a
//! testbench fault config) next to an auxiliary host clock domain, phase
//! aligns, then verifies a number of frames against the configured timing
//! profile, reporting a per-frame pixel checksum.
//!
//! Usage:
//!   cargo run -r --bin vga_check -- [--testbench faults.json] [--frames N]

use std::path::PathBuf;

use clap::Parser;

use raster::clock::ClockScheduler;
use raster::config::RasterConfig;
use raster::testbench::{CycleCounter, PatternGenerator, TestbenchConfig};
use raster::verifier::FrameVerifier;

#[derive(Parser, Debug)]
#[command(name = "vga_check")]
#[command(about = "VGA frame timing verification against a simulated signal source")]
struct Args {
    /// Path to project configuration file.
    ///
    /// If not specified, searches for `raster.toml` in the current
    /// directory and parent directories. CLI arguments override config
    /// file values.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Testbench configuration JSON file (fault injection).
    ///
    /// Can also be set via `sim.testbench` in raster.toml.
    #[clap(long)]
    testbench: Option<PathBuf>,

    /// Number of frames to verify after phase alignment.
    #[clap(long)]
    frames: Option<usize>,

    /// Increase verbosity (can be repeated: -vv for trace level).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (can be repeated: -qq for error level).
    #[clap(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

fn init_logging(verbose: u8, quiet: u8) {
    use simplelog::*;
    let level = match (verbose, quiet) {
        (0, 0) => LevelFilter::Info,
        (1, _) => LevelFilter::Debug,
        (v, _) if v >= 2 => LevelFilter::Trace,
        (_, 1) => LevelFilter::Warn,
        _ => LevelFilter::Error,
    };

    TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Debug)
            .set_thread_level(LevelFilter::Trace)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .unwrap();
}

/// Load config file: from explicit --config path, or auto-discover
/// raster.toml.
fn load_config(config_path: Option<&PathBuf>) -> Option<RasterConfig> {
    if let Some(path) = config_path {
        match RasterConfig::load(path) {
            Ok(mut config) => {
                let config_dir = path.parent().unwrap_or(std::path::Path::new("."));
                config.resolve_paths(config_dir);
                clilog::info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        RasterConfig::discover().map(|(config, path)| {
            clilog::info!("Auto-discovered config: {}", path.display());
            config
        })
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = load_config(args.config.as_ref()).unwrap_or_default();

    let profile = config.timing.apply(Default::default());
    if let Err(e) = profile.validate() {
        clilog::error!("invalid timing profile: {}", e);
        std::process::exit(1);
    }
    clilog::info!(
        "Timing profile: {}x{} ({}x{} total), channel scale {}",
        profile.horizontal.visible,
        profile.vertical.visible,
        profile.horizontal.total(),
        profile.vertical.total(),
        profile.channel_scale
    );

    // ── Testbench setup ──────────────────────────────────────────────────

    let testbench_path = args.testbench.or_else(|| config.sim.testbench.clone());
    let testbench = match testbench_path {
        Some(path) => match TestbenchConfig::load(&path) {
            Ok(tb) => {
                clilog::info!("Loaded testbench config: {:?}", tb);
                tb
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => TestbenchConfig::default(),
    };
    let faults = testbench.faults;
    if !faults.is_clean() {
        clilog::warn!("Injecting signal faults: {:?}", faults);
    }
    let num_frames = args.frames.or(testbench.frames).or(config.sim.frames).unwrap_or(3);

    // ── Clock domains ────────────────────────────────────────────────────

    let pixel_high = config.sim.pixel_high_period.unwrap_or(1);
    let pixel_low = config.sim.pixel_low_period.unwrap_or(0);
    let host_period = config.sim.host_clock_period.unwrap_or(4);

    let mut scheduler = ClockScheduler::new();
    let gpu = scheduler
        .add_domain(
            "pixel",
            PatternGenerator::with_faults(&profile, &faults),
            pixel_high,
            pixel_low,
            true,
        )
        .expect("cannot register pixel clock domain");
    let host = scheduler
        .add_domain("host", CycleCounter::new(), host_period, 0, true)
        .expect("cannot register host clock domain");

    // ── Phase alignment ──────────────────────────────────────────────────

    let mut verifier = FrameVerifier::new(&mut scheduler, gpu, profile);

    let timer_sync = clilog::stimer!("sync");
    if let Err(e) = verifier.sync() {
        clilog::error!("phase alignment failed: {}", e);
        std::process::exit(1);
    }
    clilog::finish!(timer_sync);
    clilog::info!("Phase aligned to the visible area");

    // ── Frame verification ───────────────────────────────────────────────

    let timer_frames = clilog::stimer!("frames");
    let mut failed = false;
    for frame in 0..num_frames {
        let mut pixels = 0u64;
        let mut checksum = 0xcbf29ce484222325u64; // FNV-1a
        let result = verifier.process_frame(&mut |x, y, color| {
            pixels += 1;
            for word in [x, y, u32::from_le_bytes([color.r, color.g, color.b, color.a])] {
                for byte in word.to_le_bytes() {
                    checksum ^= u64::from(byte);
                    checksum = checksum.wrapping_mul(0x100000001b3);
                }
            }
        });
        match result {
            Ok(()) => clilog::info!(
                "frame {}: OK, {} pixels, checksum {:016x}",
                frame,
                pixels,
                checksum
            ),
            Err(e) => {
                clilog::error!("frame {}: {}", frame, e);
                failed = true;
                break;
            }
        }
    }
    clilog::finish!(timer_frames);

    drop(verifier);
    clilog::info!("host clock cycles elapsed: {}", scheduler.module(host).cycles());

    std::process::exit(if failed { 1 } else { 0 });
}
