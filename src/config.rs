// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Project configuration file (`raster.toml`) support.
//!
//! Provides optional TOML-based project configuration that stores timing
//! profile overrides and harness options. CLI arguments always override
//! config file values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::timing::{SyncPolarity, TimingProfile};

/// Project configuration loaded from `raster.toml`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RasterConfig {
    pub timing: TimingOverrides,
    pub sim: SimConfig,
}

/// Timing profile overrides. Unset fields keep the VGA 640x480@60 defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TimingOverrides {
    pub h_visible: Option<u32>,
    pub h_front_porch: Option<u32>,
    pub h_sync_width: Option<u32>,
    pub h_back_porch: Option<u32>,
    pub h_polarity: Option<SyncPolarity>,
    pub v_visible: Option<u32>,
    pub v_front_porch: Option<u32>,
    pub v_sync_width: Option<u32>,
    pub v_back_porch: Option<u32>,
    pub v_polarity: Option<SyncPolarity>,
    pub channel_scale: Option<u32>,
}

impl TimingOverrides {
    /// Overlay the set fields onto a base profile.
    pub fn apply(&self, mut profile: TimingProfile) -> TimingProfile {
        let h = &mut profile.horizontal;
        set(&mut h.visible, self.h_visible);
        set(&mut h.front_porch, self.h_front_porch);
        set(&mut h.sync_width, self.h_sync_width);
        set(&mut h.back_porch, self.h_back_porch);
        set(&mut h.polarity, self.h_polarity);
        let v = &mut profile.vertical;
        set(&mut v.visible, self.v_visible);
        set(&mut v.front_porch, self.v_front_porch);
        set(&mut v.sync_width, self.v_sync_width);
        set(&mut v.back_porch, self.v_back_porch);
        set(&mut v.polarity, self.v_polarity);
        set(&mut profile.channel_scale, self.channel_scale);
        profile
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Harness options for `vga_check`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SimConfig {
    /// Number of frames to verify.
    pub frames: Option<usize>,
    /// Testbench JSON path (fault injection).
    pub testbench: Option<PathBuf>,
    /// High/low phase durations of the pixel clock domain.
    pub pixel_high_period: Option<u32>,
    pub pixel_low_period: Option<u32>,
    /// Full-cycle period of the auxiliary host clock domain.
    pub host_clock_period: Option<u32>,
}

impl RasterConfig {
    /// Discover a `raster.toml` config file by searching CWD and parent
    /// directories.
    ///
    /// Returns the parsed config and the path to the config file, or `None`
    /// if not found.
    pub fn discover() -> Option<(Self, PathBuf)> {
        let cwd = std::env::current_dir().ok()?;
        let mut dir = cwd.as_path();
        loop {
            let candidate = dir.join("raster.toml");
            if candidate.exists() {
                match Self::load(&candidate) {
                    Ok(mut config) => {
                        let config_dir = candidate.parent().unwrap_or(Path::new("."));
                        config.resolve_paths(config_dir);
                        return Some((config, candidate));
                    }
                    Err(e) => {
                        clilog::warn!("Found raster.toml but failed to parse: {}", e);
                        return None;
                    }
                }
            }
            dir = dir.parent()?;
        }
    }

    /// Load configuration from a specific path.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    /// Resolve relative paths against the config file's directory.
    pub fn resolve_paths(&mut self, config_dir: &Path) {
        resolve_opt_path(&mut self.sim.testbench, config_dir);
    }
}

/// Resolve a relative path against a base directory. Absolute paths are
/// unchanged.
fn resolve_opt_path(path: &mut Option<PathBuf>, base: &Path) {
    if let Some(ref mut p) = path {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config: RasterConfig = toml::from_str("").unwrap();
        assert!(config.timing.h_visible.is_none());
        assert!(config.sim.frames.is_none());
        // No overrides: the profile stays at the VGA defaults.
        let profile = config.timing.apply(TimingProfile::default());
        assert_eq!(profile, TimingProfile::vga_640x480());
    }

    #[test]
    fn test_timing_overrides() {
        let toml_str = r#"
[timing]
h_visible = 800
h_front_porch = 40
h_sync_width = 128
h_back_porch = 88
v_visible = 600
v_polarity = "active_low"
channel_scale = 8

[sim]
frames = 10
testbench = "faults.json"
"#;
        let config: RasterConfig = toml::from_str(toml_str).unwrap();
        let profile = config.timing.apply(TimingProfile::default());
        assert_eq!(profile.horizontal.total(), 800 + 40 + 128 + 88);
        assert_eq!(profile.vertical.visible, 600);
        // Untouched vertical fields keep their defaults.
        assert_eq!(profile.vertical.front_porch, 10);
        assert_eq!(profile.vertical.polarity, SyncPolarity::ActiveLow);
        assert_eq!(profile.channel_scale, 8);
        assert_eq!(config.sim.frames, Some(10));
    }

    #[test]
    fn test_path_resolution() {
        let toml_str = r#"
[sim]
testbench = "bench/faults.json"
"#;
        let mut config: RasterConfig = toml::from_str(toml_str).unwrap();
        config.resolve_paths(Path::new("/project/dir"));
        assert_eq!(
            config.sim.testbench.as_ref().unwrap(),
            &PathBuf::from("/project/dir/bench/faults.json")
        );

        let toml_str = r#"
[sim]
testbench = "/absolute/faults.json"
"#;
        let mut config: RasterConfig = toml::from_str(toml_str).unwrap();
        config.resolve_paths(Path::new("/project/dir"));
        // Absolute paths are unchanged.
        assert_eq!(
            config.sim.testbench.as_ref().unwrap(),
            &PathBuf::from("/absolute/faults.json")
        );
    }
}
