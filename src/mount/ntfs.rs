// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::Path;

use crate::mount::MountOpts;
use crate::utils::{exec_checked, Exec};

const MOUNT_PATH: &str = "/system/bin/ntfs-3g";
const FIX_PATH: &str = "/system/bin/ntfsfix";

pub fn check(exec: &dyn Exec, dev: &Path, fsck_con: &str) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    // ntfsfix only clears the dirty flag and replays the journal; real
    // repair needs the volume mounted on a Windows host.
    let out = exec.run_with_context(FIX_PATH, &["-n", &dev], fsck_con)?;
    if !out.ok() {
        return Err(io::Error::other(format!("ntfsfix failed with {}", out.status)));
    }
    Ok(())
}

pub fn mount(exec: &dyn Exec, dev: &Path, target: &Path, opts: &MountOpts) -> io::Result<()> {
    let dev = dev.to_string_lossy();
    let target = target.to_string_lossy();
    let mut options = format!(
        "utf8,uid={},gid={},fmask={:o},dmask={:o},nodev,nosuid,noexec,noatime",
        opts.uid, opts.gid, opts.mask, opts.mask
    );
    if opts.ro {
        options.push_str(",ro");
    }
    exec_checked(exec, MOUNT_PATH, &[&dev, &target, "-o", &options])?;
    Ok(())
}
