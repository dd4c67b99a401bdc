// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use rustix::mount::{mount as sys_mount, MountFlags};

/// ext volumes skip the pre-mount check; the journal replays on mount and
/// ownership is repaired afterwards with chown/restorecon.
pub fn mount(dev: &Path, target: &Path, fs_type: &str) -> io::Result<()> {
    let flags = MountFlags::NOATIME | MountFlags::NODEV | MountFlags::NOSUID;
    sys_mount(dev, target, fs_type, flags, "noauto_da_alloc").map_err(io::Error::from)
}
