// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use crate::mount::MountOpts;
use crate::utils::{exec_checked, Exec};

const FSCK_PATH: &str = "/system/bin/fsck.exfat";
const MOUNT_PATH: &str = "/system/bin/mount.exfat";

pub fn check(exec: &dyn Exec, dev: &Path, fsck_con: &str) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    let out = exec.run_with_context(FSCK_PATH, &[&dev], fsck_con)?;
    if !out.ok() {
        return Err(io::Error::other(format!(
            "fsck.exfat failed with {}",
            out.status
        )));
    }
    Ok(())
}

pub fn mount(exec: &dyn Exec, dev: &Path, target: &Path, opts: &MountOpts) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    let target = target.to_string_lossy();
    let mut options = format!(
        "uid={},gid={},fmask={:o},dmask={:o},nodev,nosuid,noatime",
        opts.uid, opts.gid, opts.mask, opts.mask
    );
    if opts.ro {
        options.push_str(",ro");
    }
    exec_checked(exec, MOUNT_PATH, &["-o", &options, &dev, &target])?;
    Ok(())
}
