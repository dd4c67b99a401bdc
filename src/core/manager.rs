// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Registry of managed disks: routes kernel block events to the owning
//! disk, resolves volumes by id for the command layer, and owns the single
//! loop-mount slot. All mutation happens under one mutex held by the
//! callers (command threads and the uevent thread).

use std::path::{Component, Path};

use crate::core::disk::{Disk, FLAG_ADOPTABLE, FLAG_DEFAULT_PRIMARY, FLAG_SD, FLAG_USB};
use crate::core::error::{Result, VoldError};
use crate::core::volume::Volume;
use crate::core::VoldContext;
use crate::defs::AID_MEDIA_RW;
use crate::uevent::{Action, UEvent};
use crate::utils;

#[cfg(feature = "virtual_cdrom")]
use crate::mount::loopdev::LoopDevice;

const MAJOR_BLOCK_MMC: u32 = 179;

/// A configured hot-plug slot from the platform config.
#[derive(Debug)]
pub struct DiskSource {
    sys_pattern: String,
    nickname: String,
    flags: u32,
}

impl DiskSource {
    pub fn new(sys_pattern: &str, nickname: &str, flags: u32) -> DiskSource {
        DiskSource {
            sys_pattern: sys_pattern.to_owned(),
            nickname: nickname.to_owned(),
            flags,
        }
    }

    pub fn matches(&self, event_path: &str) -> bool {
        utils::pattern_matches(&self.sys_pattern, event_path)
    }
}

#[cfg(feature = "virtual_cdrom")]
struct LoopSlot {
    host_path: String,
    device: LoopDevice,
    volume: Volume,
}

pub struct VolumeManager {
    ctx: VoldContext,
    sources: Vec<DiskSource>,
    disks: Vec<Disk>,
    #[cfg(feature = "virtual_cdrom")]
    loop_slot: Option<LoopSlot>,
    shut_down: bool,
}

impl VolumeManager {
    pub fn new(ctx: VoldContext) -> VolumeManager {
        VolumeManager {
            ctx,
            sources: Vec::new(),
            disks: Vec::new(),
            #[cfg(feature = "virtual_cdrom")]
            loop_slot: None,
            shut_down: false,
        }
    }

    pub fn add_disk_source(&mut self, source: DiskSource) {
        self.sources.push(source);
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.ctx.config.debug = debug;
    }

    #[allow(dead_code)]
    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn handle_block_event(&mut self, event: &UEvent) {
        if self.shut_down {
            log::warn!("ignoring block event after shutdown");
            return;
        }
        if !event.is_block_disk() {
            return;
        }
        let (Some(major), Some(minor)) = (event.major, event.minor) else {
            return;
        };
        let device = (major, minor);

        match event.action {
            Action::Add => {
                if self.disks.iter().any(|d| d.device() == device) {
                    log::debug!("duplicate add for {},{}", major, minor);
                    return;
                }
                let Some(source) = self.sources.iter().find(|s| s.matches(&event.devpath))
                else {
                    log::debug!("no disk source matches {}", event.devpath);
                    return;
                };

                let mut flags = source.flags;
                if major == MAJOR_BLOCK_MMC {
                    flags |= FLAG_SD;
                } else {
                    flags |= FLAG_USB;
                }

                let mut disk =
                    Disk::new(&event.devpath, device, &source.nickname, flags, &self.ctx);
                if let Err(e) = disk.create(&self.ctx) {
                    log::warn!("{} create failed: {}", disk.id(), e);
                }
                self.disks.push(disk);
            }
            Action::Change => {
                let ctx = &self.ctx;
                if let Some(disk) = self.disks.iter_mut().find(|d| d.device() == device) {
                    log::info!("{} media changed", disk.id());
                    if let Err(e) = disk.read_metadata(ctx) {
                        log::warn!("{} metadata read failed: {}", disk.id(), e);
                    }
                    if let Err(e) = disk.read_partitions(ctx) {
                        log::warn!("{} partition scan failed: {}", disk.id(), e);
                    }
                }
            }
            Action::Remove => {
                if let Some(pos) = self.disks.iter().position(|d| d.device() == device) {
                    let mut disk = self.disks.remove(pos);
                    if let Err(e) = disk.destroy(&self.ctx) {
                        log::warn!("{} destroy failed: {}", disk.id(), e);
                    }
                }
            }
            Action::Other => {}
        }
    }

    fn volume_mut(&mut self, id: &str) -> Option<&mut Volume> {
        #[cfg(feature = "virtual_cdrom")]
        if let Some(slot) = self.loop_slot.as_mut() {
            if let Some(vol) = slot.volume.find_volume(id) {
                return Some(vol);
            }
        }
        for disk in &mut self.disks {
            if let Some(vol) = disk.find_volume(id) {
                return Some(vol);
            }
        }
        None
    }

    #[allow(dead_code)]
    pub fn has_volume(&mut self, id: &str) -> bool {
        self.volume_mut(id).is_some()
    }

    pub fn mount_volume(&mut self, id: &str, flags: u32, user_id: i32) -> Result<()> {
        let ctx = &self.ctx;
        #[cfg(feature = "virtual_cdrom")]
        if let Some(slot) = self.loop_slot.as_mut() {
            if let Some(vol) = slot.volume.find_volume(id) {
                vol.set_mount_flags(flags);
                vol.set_mount_user_id(user_id);
                return vol.mount(ctx);
            }
        }
        for disk in &mut self.disks {
            if let Some(vol) = disk.find_volume(id) {
                vol.set_mount_flags(flags);
                vol.set_mount_user_id(user_id);
                return vol.mount(ctx);
            }
        }
        Err(VoldError::Syntax(format!("unknown volume {}", id)))
    }

    pub fn unmount_volume(&mut self, id: &str) -> Result<()> {
        // Unmounting the loop-backed volume releases the loop slot with it.
        #[cfg(feature = "virtual_cdrom")]
        {
            let is_loop = self
                .loop_slot
                .as_ref()
                .is_some_and(|s| s.volume.id() == id || s.volume.stable_name() == id);
            if is_loop {
                return self.unmount_loop(true);
            }
        }

        let ctx = &self.ctx;
        for disk in &mut self.disks {
            if let Some(vol) = disk.find_volume(id) {
                return vol.unmount(ctx);
            }
        }
        Err(VoldError::Syntax(format!("unknown volume {}", id)))
    }

    pub fn format_volume(&mut self, id: &str, fs_type: &str) -> Result<()> {
        let ctx = &self.ctx;
        for disk in &mut self.disks {
            if let Some(vol) = disk.find_volume(id) {
                return vol.format(ctx, fs_type);
            }
        }
        Err(VoldError::Syntax(format!("unknown volume {}", id)))
    }

    /// Prepares an application directory beneath a mounted volume; anything
    /// outside a known mount point is refused.
    pub fn mkdirs(&mut self, raw_path: &str) -> Result<()> {
        let path = Path::new(raw_path);
        if !path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(VoldError::Syntax(format!("invalid path {}", raw_path)));
        }

        let covered = self.disks.iter().any(|d| {
            d.volumes().iter().any(|v| {
                v.state() == crate::core::volume::VolumeState::Mounted && path.starts_with(v.path())
            })
        });
        if !covered {
            return Err(VoldError::Syntax(format!(
                "{} is not under a mounted volume",
                raw_path
            )));
        }

        std::fs::create_dir_all(path)?;
        utils::prepare_dir(path, 0o770, AID_MEDIA_RW, AID_MEDIA_RW)?;
        Ok(())
    }

    /// Tears down every disk; intended for framework restart.
    pub fn reset(&mut self) -> Result<()> {
        #[cfg(feature = "virtual_cdrom")]
        if self.loop_slot.is_some() {
            if let Err(e) = self.unmount_loop(true) {
                log::warn!("loop teardown failed during reset: {}", e);
            }
        }

        let ctx = &self.ctx;
        for disk in &mut self.disks {
            if let Err(e) = disk.destroy(ctx) {
                log::warn!("{} destroy failed: {}", disk.id(), e);
            }
        }
        self.disks.clear();
        Ok(())
    }

    /// Reset plus a latch refusing all further events.
    pub fn shutdown(&mut self) -> Result<()> {
        self.reset()?;
        self.shut_down = true;
        Ok(())
    }

    #[cfg(feature = "virtual_cdrom")]
    pub fn mount_loop(&mut self, host_path: &str) -> Result<()> {
        if self.loop_slot.is_some() {
            return Err(VoldError::Busy);
        }

        let device = LoopDevice::create()?;
        device.attach(host_path)?;

        let devno = match utils::block_dev_numbers(Path::new(&device.path)) {
            Ok(devno) => devno,
            Err(e) => {
                let _ = device.detach();
                return Err(VoldError::Io(e));
            }
        };

        let ctx = &self.ctx;
        let mut volume = Volume::new_public(devno, "loop", Path::new(""), &ctx.paths.dev_dir);
        if let Err(e) = volume.create(ctx) {
            let _ = device.detach();
            return Err(e);
        }
        if let Err(e) = volume.mount(ctx) {
            let _ = volume.destroy(ctx);
            let _ = device.detach();
            return Err(e);
        }

        self.loop_slot = Some(LoopSlot {
            host_path: host_path.to_owned(),
            device,
            volume,
        });
        Ok(())
    }

    #[cfg(feature = "virtual_cdrom")]
    pub fn unmount_loop(&mut self, force: bool) -> Result<()> {
        use crate::core::volume::VolumeState;

        let Some(mut slot) = self.loop_slot.take() else {
            return Err(VoldError::Io(std::io::Error::from_raw_os_error(
                libc::ENODEV,
            )));
        };

        let ctx = &self.ctx;
        if slot.volume.state() == VolumeState::Mounted {
            if !force {
                self.loop_slot = Some(slot);
                return Err(VoldError::Busy);
            }
            if let Err(e) = slot.volume.unmount(ctx) {
                log::warn!("loop volume unmount failed: {}", e);
            }
        }

        if let Err(e) = slot.volume.destroy(ctx) {
            log::warn!("loop volume destroy failed: {}", e);
        }
        log::info!("releasing loop device for {}", slot.host_path);
        slot.device.detach()?;
        Ok(())
    }
}
