// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use rustix::mount::{mount as sys_mount, MountFlags};

use crate::mount::MountOpts;
use crate::utils::Exec;

const FSCK_PATH: &str = "/system/bin/fsck_hfs";

pub fn check(exec: &dyn Exec, dev: &Path, fsck_con: &str) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    let out = exec.run_with_context(FSCK_PATH, &["-p", &dev], fsck_con)?;
    if !out.ok() {
        return Err(io::Error::other(format!("fsck_hfs failed with {}", out.status)));
    }
    Ok(())
}

pub fn mount(dev: &Path, target: &Path, opts: &MountOpts) -> io::Result<()> {
    let mut flags = MountFlags::NODEV | MountFlags::NOSUID | MountFlags::NOATIME;
    if opts.ro {
        flags |= MountFlags::RDONLY;
    }
    let data = format!("uid={},gid={}", opts.uid, opts.gid);
    sys_mount(dev, target, "hfs", flags, data).map_err(io::Error::from)
}
