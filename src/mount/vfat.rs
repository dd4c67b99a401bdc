// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use rustix::mount::{mount as sys_mount, MountFlags};

use crate::mount::MountOpts;
use crate::utils::Exec;

const FSCK_PATH: &str = "/system/bin/fsck_msdos";
const MKFS_PATH: &str = "/system/bin/newfs_msdos";

pub fn check(exec: &dyn Exec, dev: &Path, fsck_con: &str) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    let out = exec.run_with_context(FSCK_PATH, &["-p", "-f", &dev], fsck_con)?;
    // Exit 1 means errors were found and repaired.
    match out.status {
        0 => Ok(()),
        1 => {
            log::info!("{} had errors, repaired", dev);
            Ok(())
        }
        n => Err(io::Error::other(format!("fsck_msdos failed with {}", n))),
    }
}

pub fn mount(dev: &Path, target: &Path, opts: &MountOpts) -> io::Result<()> {
    let mut flags = MountFlags::NODEV
        | MountFlags::NOSUID
        | MountFlags::NOEXEC
        | MountFlags::NOATIME
        | MountFlags::DIRSYNC;
    if opts.ro {
        flags |= MountFlags::RDONLY;
    }
    let data = format!(
        "utf8,uid={},gid={},fmask={:o},dmask={:o},shortname=mixed",
        opts.uid, opts.gid, opts.mask, opts.mask
    );
    sys_mount(dev, target, "vfat", flags, data).map_err(io::Error::from)
}

pub fn format(exec: &dyn Exec, dev: &Path) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    let out = exec.run(MKFS_PATH, &["-F", "32", "-O", "android", "-A", &dev])?;
    if !out.ok() {
        return Err(io::Error::other(format!(
            "newfs_msdos failed with {}",
            out.status
        )));
    }
    Ok(())
}
