// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-filesystem helpers. Each module exposes `check`, `mount` and (for
//! vfat) `format`; volumes dispatch on the probed fsType string.

pub mod exfat;
pub mod ext;
pub mod hfsplus;
pub mod iso9660;
#[cfg(feature = "virtual_cdrom")]
pub mod loopdev;
pub mod ntfs;
pub mod vfat;

use std::io;
use std::path::Path;

use crate::utils::Exec;

/// Mount ownership handed to all removable media.
#[derive(Debug, Clone, Copy)]
pub struct MountOpts {
    pub uid: u32,
    pub gid: u32,
    pub mask: u32,
    pub ro: bool,
}

pub fn is_supported(fs_type: &str) -> bool {
    matches!(fs_type, "vfat" | "ntfs" | "exfat" | "hfs" | "iso9660" | "udf")
        || fs_type.starts_with("ext")
}

/// Pre-mount consistency check; a no-op for ext (checked separately with the
/// trusted context) and read-only media.
pub fn check(
    exec: &dyn Exec,
    fs_type: &str,
    dev: &Path,
    fsck_untrusted_con: &str,
) -> io::Result<()> {
    match fs_type {
        "vfat" => vfat::check(exec, dev, fsck_untrusted_con),
        "exfat" => exfat::check(exec, dev, fsck_untrusted_con),
        "ntfs" => ntfs::check(exec, dev, fsck_untrusted_con),
        "hfs" => hfsplus::check(exec, dev, fsck_untrusted_con),
        _ => Ok(()),
    }
}

/// Mounts `dev` on `target` with the canonical options for `fs_type`.
pub fn mount(
    exec: &dyn Exec,
    fs_type: &str,
    dev: &Path,
    target: &Path,
    opts: &MountOpts,
) -> io::Result<()> {
    match fs_type {
        "vfat" => vfat::mount(dev, target, opts),
        "ntfs" => ntfs::mount(exec, dev, target, opts),
        "exfat" => exfat::mount(exec, dev, target, opts),
        "hfs" => hfsplus::mount(dev, target, opts),
        "iso9660" | "udf" => iso9660::mount(dev, target, opts),
        fs if fs.starts_with("ext") => ext::mount(dev, target, fs),
        other => Err(io::Error::other(format!("no mount handler for {}", other))),
    }
}
