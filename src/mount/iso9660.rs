// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use rustix::mount::{mount as sys_mount, MountFlags};

use crate::mount::MountOpts;

/// Optical media is always read-only; tries iso9660 first and falls back to
/// udf for DVD-style discs.
pub fn mount(dev: &Path, target: &Path, opts: &MountOpts) -> io::Result<()> {
    let flags = MountFlags::RDONLY | MountFlags::NODEV | MountFlags::NOSUID;
    let data = format!("uid={},gid={}", opts.uid, opts.gid);

    if sys_mount(dev, target, "iso9660", flags, &*data).is_ok() {
        return Ok(());
    }
    sys_mount(dev, target, "udf", flags, &*data).map_err(io::Error::from)
}
