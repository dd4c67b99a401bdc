// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Loop-device plumbing for the virtual CDROM slot.

use std::{
    fs, io,
    os::fd::{AsRawFd, OwnedFd},
};

use linux_raw_sys::loop_device::{LOOP_CLR_FD, LOOP_CTL_GET_FREE, LOOP_SET_FD, LOOP_SET_STATUS64};

const LOOP_CONTROL: &str = "/dev/loop-control";

/// An attached loop device backing a host file.
pub struct LoopDevice {
    fd: OwnedFd,
    pub path: String,
    pub number: u32,
}

impl LoopDevice {
    /// Grabs the next free loop device from /dev/loop-control.
    pub fn create() -> io::Result<Self> {
        use std::fs::OpenOptions;

        let ctrl = OpenOptions::new().read(true).write(true).open(LOOP_CONTROL)?;

        let devno = unsafe { libc::ioctl(ctrl.as_raw_fd(), LOOP_CTL_GET_FREE as _) };
        if devno < 0 {
            return Err(io::Error::last_os_error());
        }

        let path = format!("/dev/block/loop{}", devno);
        // Some platforms only populate /dev/loopN.
        let path = if fs::metadata(&path).is_ok() {
            path
        } else {
            format!("/dev/loop{}", devno)
        };

        log::debug!("acquired loop device {}", path);
        let fd = OpenOptions::new().read(true).write(true).open(&path)?.into();

        Ok(LoopDevice {
            fd,
            path,
            number: devno as u32,
        })
    }

    /// Attaches `backing_file`, making the file readable as a block device.
    pub fn attach(&self, backing_file: &str) -> io::Result<()> {
        let f = fs::OpenOptions::new().read(true).open(backing_file)?;

        let res = unsafe { libc::ioctl(self.fd.as_raw_fd(), LOOP_SET_FD as _, f.as_raw_fd()) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }

        // Force the kernel to publish the new status immediately.
        let info: linux_raw_sys::loop_device::loop_info64 = unsafe { std::mem::zeroed() };
        let res = unsafe { libc::ioctl(self.fd.as_raw_fd(), LOOP_SET_STATUS64 as _, &info) };
        if res < 0 {
            let e = io::Error::last_os_error();
            let _ = self.detach();
            return Err(e);
        }

        log::info!("attached {} to {}", backing_file, self.path);
        Ok(())
    }

    pub fn detach(&self) -> io::Result<()> {
        let res = unsafe { libc::ioctl(self.fd.as_raw_fd(), LOOP_CLR_FD as _, 0) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        log::info!("detached loop device {}", self.path);
        Ok(())
    }
}
