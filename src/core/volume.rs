// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! A mountable entity within a disk: one per recognised partition, or a
//! whole-disk fallback. Only the public kind exists today; the sum type is
//! the seam where private/emulated volumes would slot in.

use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use crate::core::error::{Result, VoldError};
use crate::core::events;
use crate::core::VoldContext;
use crate::defs::{AID_MEDIA_RW, AID_ROOT, BLKID_PATH, CHOWN_PATH, MEDIA_RW_NAME, RESTORECON_PATH};
use crate::mount as fsm;
use crate::utils;

const SR_MAJOR: u32 = 11;

/// Mount-table poll used when the platform vold owns vfat media.
const VFAT_DEFER_POLLS: u32 = 10;
const VFAT_DEFER_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VolumeState {
    Unmounted = 0,
    Checking = 1,
    Mounted = 2,
    Formatting = 4,
    Ejecting = 5,
    Unmountable = 6,
    Removed = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VolumeType {
    Public = 0,
}

/// State specific to the public kind.
#[derive(Debug, Default)]
pub struct PublicState {
    /// Set when an optical disc is mounted as iso9660/udf.
    pub sr_mounted: bool,
    /// Sidecar helper process to reap on unmount, 0 when none was spawned.
    pub helper_pid: i32,
}

#[derive(Debug)]
pub enum VolumeKind {
    Public(PublicState),
}

#[derive(Debug)]
pub struct Volume {
    id: String,
    disk_id: String,
    #[allow(dead_code)]
    sys_path: PathBuf,
    kind: VolumeKind,
    device: Option<(u32, u32)>,
    dev_path: PathBuf,
    /// Whether we made the device node (partition-derived volumes) and must
    /// remove it on destroy.
    owns_node: bool,
    state: VolumeState,
    created: bool,
    fs_type: String,
    fs_uuid: String,
    fs_label: String,
    raw_path: PathBuf,
    #[allow(dead_code)]
    internal_path: PathBuf,
    path: PathBuf,
    #[allow(dead_code)]
    mount_flags: u32,
    #[allow(dead_code)]
    mount_user_id: i32,
    silent: bool,
    /// Stacked child volumes. Public volumes never nest, but lookup walks
    /// the tree so future kinds inherit the contract.
    volumes: Vec<Volume>,
}

impl Volume {
    /// A volume backed by a partition we enumerate ourselves; the device
    /// node under the daemon's own directory is created on `create`.
    pub fn new_public(device: (u32, u32), disk_id: &str, sys_path: &Path, dev_dir: &Path) -> Volume {
        let id = format!("public:{},{}", device.0, device.1);
        let dev_path = dev_dir.join(&id);
        Volume {
            id,
            disk_id: disk_id.to_owned(),
            sys_path: sys_path.to_owned(),
            kind: VolumeKind::Public(PublicState::default()),
            device: Some(device),
            dev_path,
            owns_node: true,
            state: VolumeState::Unmounted,
            created: false,
            fs_type: String::new(),
            fs_uuid: String::new(),
            fs_label: String::new(),
            raw_path: PathBuf::new(),
            internal_path: PathBuf::new(),
            path: PathBuf::new(),
            mount_flags: 0,
            mount_user_id: -1,
            silent: false,
            volumes: Vec::new(),
        }
    }

    /// A volume bound to a kernel-named device node, for disks that expose
    /// no separate partition nodes.
    pub fn new_public_physical(
        dev_name: &str,
        disk_id: &str,
        sys_path: &Path,
        dev_block_dir: &Path,
    ) -> Volume {
        let mut vol = Self::new_public((0, 0), disk_id, sys_path, dev_block_dir);
        vol.id = dev_name.to_owned();
        vol.dev_path = dev_block_dir.join(dev_name);
        vol.device = None;
        vol.owns_node = false;
        vol
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[allow(dead_code)]
    pub fn disk_id(&self) -> &str {
        &self.disk_id
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    #[allow(dead_code)]
    pub fn created(&self) -> bool {
        self.created
    }

    #[allow(dead_code)]
    pub fn dev_path(&self) -> &Path {
        &self.dev_path
    }

    #[allow(dead_code)]
    pub fn fs_type(&self) -> &str {
        &self.fs_type
    }

    #[allow(dead_code)]
    pub fn fs_uuid(&self) -> &str {
        &self.fs_uuid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(dead_code)]
    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    pub fn is_sr_mounted(&self) -> bool {
        match &self.kind {
            VolumeKind::Public(p) => p.sr_mounted,
        }
    }

    /// Filesystem UUID when known, else the volume id; keeps mount points
    /// stable across re-insertion.
    pub fn stable_name(&self) -> &str {
        if self.fs_uuid.is_empty() {
            &self.id
        } else {
            &self.fs_uuid
        }
    }

    pub fn set_mount_flags(&mut self, flags: u32) {
        self.mount_flags = flags;
    }

    pub fn set_mount_user_id(&mut self, user_id: i32) {
        self.mount_user_id = user_id;
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn set_path(&mut self, path: &Path) {
        self.path = path.to_owned();
    }

    pub fn set_internal_path(&mut self, path: &Path) {
        self.internal_path = path.to_owned();
    }

    pub fn find_volume(&mut self, id: &str) -> Option<&mut Volume> {
        if self.id == id {
            return Some(self);
        }
        for vol in &mut self.volumes {
            if let Some(found) = vol.find_volume(id) {
                return Some(found);
            }
        }
        None
    }

    fn notify(&self, ctx: &VoldContext, code: u32, value: &str) {
        if self.silent {
            return;
        }
        if value.is_empty() {
            ctx.broadcaster.broadcast(code, &self.id);
        } else {
            ctx.broadcaster.broadcast(code, &format!("{} {}", self.id, value));
        }
    }

    fn set_state(&mut self, ctx: &VoldContext, state: VolumeState) {
        self.state = state;
        self.notify(ctx, events::VOLUME_STATE_CHANGED, &(state as u32).to_string());
    }

    pub fn create(&mut self, ctx: &VoldContext) -> Result<()> {
        if self.created {
            return Err(VoldError::State(format!("{} already created", self.id)));
        }
        self.created = true;
        self.state = VolumeState::Unmounted;

        if self.owns_node {
            if let Some((major, minor)) = self.device {
                if let Err(e) = utils::create_device_node(&self.dev_path, major, minor) {
                    log::warn!("{} failed to create device node: {}", self.id, e);
                }
            }
        }

        self.notify(
            ctx,
            events::VOLUME_CREATED,
            &format!("{} {}", VolumeType::Public as u32, self.disk_id),
        );
        Ok(())
    }

    pub fn destroy(&mut self, ctx: &VoldContext) -> Result<()> {
        if !self.created {
            return Err(VoldError::State(format!("{} not created", self.id)));
        }

        if self.state == VolumeState::Mounted {
            if let Err(e) = self.unmount(ctx) {
                log::warn!("{} failed to unmount before destroy: {}", self.id, e);
            }
        }

        for vol in &mut self.volumes {
            let _ = vol.destroy(ctx);
        }
        self.volumes.clear();

        if self.owns_node {
            utils::destroy_device_node(&self.dev_path)?;
        }

        self.notify(ctx, events::VOLUME_DESTROYED, "");
        self.state = VolumeState::Removed;
        self.created = false;
        Ok(())
    }

    pub fn mount(&mut self, ctx: &VoldContext) -> Result<()> {
        if self.state != VolumeState::Unmounted {
            return Err(VoldError::State(format!(
                "{} cannot be mounted in state {:?}",
                self.id, self.state
            )));
        }

        self.set_state(ctx, VolumeState::Checking);
        match self.do_mount(ctx) {
            Ok(()) => {
                self.set_state(ctx, VolumeState::Mounted);
                Ok(())
            }
            Err(e @ VoldError::Unsupported(_)) => {
                self.set_state(ctx, VolumeState::Unmountable);
                Err(e)
            }
            Err(e) => {
                self.set_state(ctx, VolumeState::Unmounted);
                Err(e)
            }
        }
    }

    pub fn unmount(&mut self, ctx: &VoldContext) -> Result<()> {
        if self.state != VolumeState::Mounted {
            return Err(VoldError::State(format!(
                "{} cannot be unmounted in state {:?}",
                self.id, self.state
            )));
        }

        self.set_state(ctx, VolumeState::Ejecting);
        let res = self.do_unmount();
        self.set_state(ctx, VolumeState::Unmounted);
        res
    }

    pub fn format(&mut self, ctx: &VoldContext, fs_type: &str) -> Result<()> {
        if self.state != VolumeState::Unmounted && self.state != VolumeState::Unmountable {
            return Err(VoldError::State(format!(
                "{} cannot be formatted in state {:?}",
                self.id, self.state
            )));
        }

        if fs_type != "vfat" && fs_type != "auto" {
            return Err(VoldError::Unsupported(format!("filesystem {}", fs_type)));
        }

        self.set_state(ctx, VolumeState::Formatting);
        let res = self.do_format(ctx);
        self.set_state(ctx, VolumeState::Unmounted);
        res
    }

    /// Probes the filesystem and broadcasts the result. An empty UUID gets a
    /// stable placeholder so upstream consumers never key on "".
    fn read_metadata(&mut self, ctx: &VoldContext) -> Result<()> {
        let (fs_type, uuid, label) =
            probe_filesystem(ctx, &self.dev_path)?.unwrap_or_default();
        self.fs_type = fs_type;
        self.fs_uuid = uuid;
        self.fs_label = label;

        if ctx.config.debug {
            log::debug!("blkid devPath={} fsType={}", self.dev_path.display(), self.fs_type);
        }

        if self.fs_uuid.is_empty() {
            self.fs_uuid = match self.device {
                Some((SR_MAJOR, _)) => "sr0".to_owned(),
                _ => self.id.clone(),
            };
        }

        self.notify(ctx, events::VOLUME_FS_TYPE_CHANGED, &self.fs_type.clone());
        self.notify(ctx, events::VOLUME_FS_UUID_CHANGED, &self.fs_uuid.clone());
        self.notify(ctx, events::VOLUME_FS_LABEL_CHANGED, &self.fs_label.clone());
        Ok(())
    }

    fn do_mount(&mut self, ctx: &VoldContext) -> Result<()> {
        self.read_metadata(ctx)?;

        if !fsm::is_supported(&self.fs_type) {
            return Err(VoldError::Unsupported(format!(
                "filesystem {:?} on {}",
                self.fs_type, self.id
            )));
        }

        let raw_path = ctx.paths.media_dir.join(self.stable_name());

        if self.fs_type == "vfat" && ctx.config.defer_vfat_to_vold {
            for _ in 0..VFAT_DEFER_POLLS {
                if utils::is_mountpoint_mounted(&raw_path) {
                    log::debug!("{} vfat handled by platform vold", self.id);
                    self.set_internal_path(&raw_path);
                    self.set_path(&raw_path);
                    self.raw_path = raw_path;
                    return Ok(());
                }
                thread::sleep(VFAT_DEFER_INTERVAL);
            }
        }

        if utils::is_mountpoint_mounted(&raw_path) {
            return Err(VoldError::Already(raw_path.display().to_string()));
        }

        fsm::check(
            ctx.exec.as_ref(),
            &self.fs_type,
            &self.dev_path,
            &ctx.contexts.fsck_untrusted,
        )
        .map_err(|e| VoldError::TransientIo(format!("check of {} failed: {}", self.id, e)))?;

        self.prepare_mount_point(&raw_path)?;

        let opts = fsm::MountOpts {
            uid: AID_MEDIA_RW,
            gid: AID_MEDIA_RW,
            mask: 0o007,
            ro: false,
        };
        if let Err(e) = fsm::mount(ctx.exec.as_ref(), &self.fs_type, &self.dev_path, &raw_path, &opts)
        {
            utils::remove_dir_if_empty(&raw_path);
            return Err(VoldError::TransientIo(format!(
                "failed to mount {} as {}: {}",
                self.dev_path.display(),
                self.fs_type,
                e
            )));
        }
        log::info!(
            "successfully mounted {} as {}",
            self.dev_path.display(),
            self.fs_type
        );

        if self.fs_type == "iso9660" || self.fs_type == "udf" {
            let VolumeKind::Public(p) = &mut self.kind;
            p.sr_mounted = true;
        }

        if self.fs_type.starts_with("ext") {
            if let Err(e) = self.finish_ext_mount(ctx, &raw_path) {
                let _ = utils::force_unmount(&raw_path);
                utils::remove_dir_if_empty(&raw_path);
                return Err(e);
            }
        }

        self.set_internal_path(&raw_path);
        self.set_path(&raw_path);
        self.raw_path = raw_path;
        Ok(())
    }

    /// ext media arrives owned by whoever wrote it; hand the tree to
    /// media_rw and restore labels before exposing it.
    fn finish_ext_mount(&self, ctx: &VoldContext, raw_path: &Path) -> Result<()> {
        let target = raw_path.to_string_lossy();
        let owner = format!("{}:{}", MEDIA_RW_NAME, MEDIA_RW_NAME);
        utils::exec_checked(ctx.exec.as_ref(), CHOWN_PATH, &["-R", &owner, &target])
            .map_err(|e| VoldError::TransientIo(format!("chown failed: {}", e)))?;
        utils::exec_checked(ctx.exec.as_ref(), RESTORECON_PATH, &["-R", &target])
            .map_err(|e| VoldError::TransientIo(format!("restorecon failed: {}", e)))?;
        Ok(())
    }

    /// Creates the mount point root-owned 0700. A stale FUSE endpoint shows
    /// up as ENOTCONN here; lazy-unmount it and try once more.
    fn prepare_mount_point(&self, raw_path: &Path) -> Result<()> {
        match utils::prepare_dir(raw_path, 0o700, AID_ROOT, AID_ROOT) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => {
                log::info!("unmounting stale {} and retrying", raw_path.display());
                utils::lazy_unmount(raw_path)
                    .map_err(|e| VoldError::TransientIo(format!("lazy unmount failed: {}", e)))?;
                utils::prepare_dir(raw_path, 0o700, AID_ROOT, AID_ROOT).map_err(|e| {
                    VoldError::TransientIo(format!("failed to create mount point: {}", e))
                })
            }
            Err(e) => Err(VoldError::TransientIo(format!(
                "failed to create mount point: {}",
                e
            ))),
        }
    }

    fn do_unmount(&mut self) -> Result<()> {
        // Unmount before killing any sidecar; killing first turns pending
        // file operations into ENOTCONN for applications.
        utils::kill_processes_using_path(&self.path);

        utils::force_unmount(&self.raw_path)
            .map_err(|e| VoldError::TransientIo(format!("unmount failed: {}", e)))?;

        let VolumeKind::Public(p) = &mut self.kind;
        if p.helper_pid > 0 {
            let pid = Pid::from_raw(p.helper_pid);
            let _ = kill(pid, Signal::SIGTERM);
            let _ = waitpid(pid, None);
            p.helper_pid = 0;
        }
        p.sr_mounted = false;

        utils::remove_dir_if_empty(&self.raw_path);
        self.raw_path = PathBuf::new();
        self.internal_path = PathBuf::new();
        self.path = PathBuf::new();
        Ok(())
    }

    fn do_format(&mut self, ctx: &VoldContext) -> Result<()> {
        if let Err(e) = utils::wipe_block_device(&self.dev_path) {
            log::warn!("{} failed to wipe: {}", self.id, e);
        }
        fsm::vfat::format(ctx.exec.as_ref(), &self.dev_path)
            .map_err(|e| VoldError::TransientIo(format!("{} failed to format: {}", self.id, e)))
    }
}

/// blkid probe of a device: `(fsType, uuid, label)`, `None` when nothing was
/// recognised. Runs with the untrusted context; the media is user-supplied.
pub fn probe_filesystem(
    ctx: &VoldContext,
    dev: &Path,
) -> Result<Option<(String, String, String)>> {
    let dev = dev.to_string_lossy();
    let out = ctx
        .exec
        .run_with_context(
            BLKID_PATH,
            &["-c", "/dev/null", "-s", "TYPE", "-s", "UUID", "-s", "LABEL", &dev],
            &ctx.contexts.blkid_untrusted,
        )
        .map_err(|e| VoldError::TransientIo(format!("blkid failed: {}", e)))?;

    // blkid exits 2 when it finds nothing; that is a probe miss, not an
    // error.
    if !out.ok() {
        return Ok(None);
    }

    for line in &out.lines {
        if !line.starts_with(dev.as_ref()) {
            continue;
        }
        let fs_type = blkid_field(line, "TYPE").unwrap_or_default();
        if fs_type.is_empty() {
            continue;
        }
        let uuid = blkid_field(line, "UUID").unwrap_or_default();
        let label = blkid_field(line, "LABEL").unwrap_or_default();
        return Ok(Some((fs_type, uuid, label)));
    }
    Ok(None)
}

fn blkid_field(line: &str, key: &str) -> Option<String> {
    let marker = format!("{}=\"", key);
    let start = line.find(&marker)? + marker.len();
    let end = line[start..].find('"')? + start;
    Some(line[start..end].to_owned())
}
