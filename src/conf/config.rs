// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defs::CONFIG_FILE_DEFAULT;

/// One managed hot-plug slot: block-add events whose sysfs path matches
/// `sys_pattern` become disks named after `nickname`.
#[derive(Debug, Clone, Serialize, Deserialize)]

pub struct DiskSourceConfig {
    pub sys_pattern: String,
    pub nickname: String,
    #[serde(default)]
    pub adoptable: bool,
    #[serde(default)]
    pub default_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]

pub struct Config {
    #[serde(default)]
    pub debug: bool,
    /// Set on emulator builds; enables the virtio-blk major heuristic.
    #[serde(default)]
    pub emulator: bool,
    /// The platform vold owns vfat media; we only verify its mount appears.
    #[serde(default)]
    pub defer_vfat_to_vold: bool,
    /// Reject unrecognised MBR partition types instead of letting the
    /// filesystem probe decide.
    #[serde(default)]
    pub strict_mbr: bool,
    #[serde(default)]
    pub sources: Vec<DiskSourceConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        Self::from_file(Path::new(CONFIG_FILE_DEFAULT))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}
