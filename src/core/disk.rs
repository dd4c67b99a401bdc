// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! A whole block device recognised by the daemon: probes its identity,
//! scans its partition table and owns the resulting volumes.

use std::path::{Path, PathBuf};

use crate::core::error::{Result, VoldError};
use crate::core::events;
use crate::core::scanner::{self, PartKind, Table};
use crate::core::volume::{probe_filesystem, Volume};
use crate::core::VoldContext;
use crate::defs::SGDISK_PATH;
use crate::utils;

pub const FLAG_ADOPTABLE: u32 = 1 << 0;
pub const FLAG_DEFAULT_PRIMARY: u32 = 1 << 1;
pub const FLAG_SD: u32 = 1 << 2;
pub const FLAG_USB: u32 = 1 << 3;

const MAJOR_BLOCK_SR: u32 = 11;
const MAJOR_BLOCK_MMC: u32 = 179;
/// "LOCAL/EXPERIMENTAL USE" majors; virtio-blk lives here on emulators.
const MAJOR_BLOCK_EXPERIMENTAL_MIN: u32 = 240;
const MAJOR_BLOCK_EXPERIMENTAL_MAX: u32 = 254;

const SCSI_MAJORS: &[u32] = &[
    8, 65, 66, 67, 68, 69, 70, 71, 128, 129, 130, 131, 132, 133, 134, 135,
];

fn is_scsi_major(major: u32) -> bool {
    SCSI_MAJORS.contains(&major)
}

fn is_virtio_blk_device(ctx: &VoldContext, major: u32) -> bool {
    // virtio-blk has no fixed major; only trust the experimental range when
    // we know we are running on the emulator.
    ctx.config.emulator
        && (MAJOR_BLOCK_EXPERIMENTAL_MIN..=MAJOR_BLOCK_EXPERIMENTAL_MAX).contains(&major)
}

#[derive(Debug)]
pub struct Disk {
    id: String,
    #[allow(dead_code)]
    event_path: String,
    sys_path: PathBuf,
    dev_path: PathBuf,
    device: (u32, u32),
    size: i64,
    label: String,
    #[allow(dead_code)]
    nickname: String,
    flags: u32,
    created: bool,
    just_partitioned: bool,
    /// Optical drives carry a single pseudo-partition discovered on media
    /// change, never via the partition table.
    sr_disk: bool,
    volumes: Vec<Volume>,
}

impl Disk {
    pub fn new(
        event_path: &str,
        device: (u32, u32),
        nickname: &str,
        flags: u32,
        ctx: &VoldContext,
    ) -> Disk {
        let id = format!("disk:{},{}", device.0, device.1);
        let sys_path = ctx.paths.sys_root.join(event_path.trim_start_matches('/'));
        let dev_path = ctx.paths.dev_dir.join(&id);

        if let Err(e) = utils::create_device_node(&dev_path, device.0, device.1) {
            log::warn!("{} failed to create device node: {}", id, e);
        }

        Disk {
            id,
            event_path: event_path.to_owned(),
            sys_path,
            dev_path,
            device,
            size: -1,
            label: String::new(),
            nickname: nickname.to_owned(),
            flags,
            created: false,
            just_partitioned: false,
            sr_disk: nickname.starts_with("sr"),
            volumes: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device(&self) -> (u32, u32) {
        self.device
    }

    pub fn dev_path(&self) -> &Path {
        &self.dev_path
    }

    pub fn created(&self) -> bool {
        self.created
    }

    #[allow(dead_code)]
    pub fn size(&self) -> i64 {
        self.size
    }

    #[allow(dead_code)]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[allow(dead_code)]
    pub fn set_just_partitioned(&mut self, value: bool) {
        self.just_partitioned = value;
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    #[allow(dead_code)]
    pub fn is_srdisk_mounted(&self) -> bool {
        self.sr_disk && self.volumes.iter().any(|v| v.is_sr_mounted())
    }

    fn notify(&self, ctx: &VoldContext, code: u32, value: &str) {
        if value.is_empty() {
            ctx.broadcaster.broadcast(code, &self.id);
        } else {
            ctx.broadcaster.broadcast(code, &format!("{} {}", self.id, value));
        }
    }

    pub fn create(&mut self, ctx: &VoldContext) -> Result<()> {
        if self.created {
            return Err(VoldError::State(format!("{} already created", self.id)));
        }
        self.created = true;
        self.notify(ctx, events::DISK_CREATED, &self.flags.to_string());

        // Nothing to probe on an empty optical drive; media shows up later
        // as a change event.
        if !self.sr_disk {
            if let Err(e) = self.read_metadata(ctx) {
                log::warn!("{} metadata read failed: {}", self.id, e);
            }
            if let Err(e) = self.read_partitions(ctx) {
                log::warn!("{} partition scan failed: {}", self.id, e);
            }
        }
        Ok(())
    }

    pub fn destroy(&mut self, ctx: &VoldContext) -> Result<()> {
        if !self.created {
            return Err(VoldError::State(format!("{} not created", self.id)));
        }
        self.destroy_all_volumes(ctx);
        self.notify(ctx, events::DISK_DESTROYED, "");
        self.created = false;

        if let Err(e) = utils::destroy_device_node(&self.dev_path) {
            log::warn!("{} failed to remove device node: {}", self.id, e);
        }
        Ok(())
    }

    pub fn find_volume(&mut self, id: &str) -> Option<&mut Volume> {
        for vol in &mut self.volumes {
            if let Some(found) = vol.find_volume(id) {
                return Some(found);
            }
        }
        None
    }

    #[allow(dead_code)]
    pub fn unmount_all(&mut self, ctx: &VoldContext) {
        for vol in &mut self.volumes {
            if let Err(e) = vol.unmount(ctx) {
                log::warn!("{} unmount failed: {}", vol.id(), e);
            }
        }
    }

    fn destroy_all_volumes(&mut self, ctx: &VoldContext) {
        for vol in &mut self.volumes {
            if let Err(e) = vol.destroy(ctx) {
                log::warn!("{} destroy failed: {}", vol.id(), e);
            }
        }
        self.volumes.clear();
    }

    /// Reads size and a user-facing label, classifying the device by major.
    pub fn read_metadata(&mut self, ctx: &VoldContext) -> Result<()> {
        self.size = utils::block_device_size(&self.dev_path);
        self.label.clear();

        let major = self.device.0;
        if major == MAJOR_BLOCK_SR || is_scsi_major(major) {
            let vendor: String = utils::sysfs_read(&self.sys_path, "device/vendor")
                .ok_or_else(|| {
                    VoldError::TransientIo(format!("{} has no vendor attribute", self.id))
                })?;
            self.label = vendor;
        } else if major == MAJOR_BLOCK_MMC {
            // Match whatever is silk-screened on the card; white-label
            // manfids stay blank on purpose.
            let raw: String = utils::sysfs_read(&self.sys_path, "device/manfid")
                .ok_or_else(|| {
                    VoldError::TransientIo(format!("{} has no manfid attribute", self.id))
                })?;
            let raw = raw.strip_prefix("0x").unwrap_or(&raw);
            let manfid = u64::from_str_radix(raw, 16).unwrap_or(0);
            self.label = match manfid {
                0x000003 => "SanDisk",
                0x00001b => "Samsung",
                0x000028 => "Lexar",
                0x000074 => "Transcend",
                _ => "",
            }
            .to_owned();
        } else if is_virtio_blk_device(ctx, major) {
            log::debug!(
                "{} experimental major {} recognised as virtio-blk",
                self.id,
                major
            );
            self.label = "Virtual".to_owned();
        } else {
            log::warn!("{} unsupported block major {}", self.id, major);
            return Err(VoldError::Unsupported(format!("block major {}", major)));
        }

        self.notify(ctx, events::DISK_SIZE_CHANGED, &self.size.to_string());
        self.notify(ctx, events::DISK_LABEL_CHANGED, &self.label.clone());
        self.notify(
            ctx,
            events::DISK_SYS_PATH_CHANGED,
            &self.sys_path.display().to_string(),
        );
        Ok(())
    }

    /// Maximum partition devices the bus supports.
    fn max_minors(&self, ctx: &VoldContext) -> Result<u32> {
        let major = self.device.0;
        if is_scsi_major(major) {
            // Per Documentation/devices.txt this is static.
            return Ok(31);
        }
        if major == MAJOR_BLOCK_MMC {
            // Per Documentation/devices.txt this is dynamic.
            let node = ctx.paths.sys_root.join("module/mmcblk/parameters");
            return utils::sysfs_read(&node, "perdev_minors").ok_or_else(|| {
                VoldError::TransientIo("failed to read mmc perdev_minors".to_owned())
            });
        }
        if is_virtio_blk_device(ctx, major) {
            // virtio_blk.c: PART_BITS 4, so 2^4 - 1.
            return Ok(15);
        }
        Err(VoldError::Unsupported(format!("block major {}", major)))
    }

    pub fn read_partitions(&mut self, ctx: &VoldContext) -> Result<()> {
        if self.sr_disk {
            log::info!("{} srdisk, trying entire disk as fake partition", self.id);
            self.create_public_volume(ctx, self.device);
            return Ok(());
        }

        let max_minors = self.max_minors(ctx)?;
        self.destroy_all_volumes(ctx);

        let dev_path = self.dev_path.display().to_string();
        let output = match ctx.exec.run(SGDISK_PATH, &["--android-dump", &dev_path]) {
            Ok(out) if out.ok() => out,
            other => {
                log::warn!("sgdisk failed to scan {}", dev_path);
                self.notify(ctx, events::DISK_SCANNED, "");
                self.just_partitioned = false;
                return match other {
                    Ok(out) => Err(VoldError::TransientIo(format!(
                        "sgdisk exited with {}",
                        out.status
                    ))),
                    Err(e) => Err(VoldError::TransientIo(format!("sgdisk failed: {}", e))),
                };
            }
        };

        let dump = scanner::parse_dump(&self.id, &output.lines, max_minors);
        let mut handled_physical = false;

        for part in &dump.parts {
            match &part.kind {
                PartKind::Mbr(mbr_type) => {
                    // A card reader that exposes only the disk node cannot
                    // take per-partition nodes; bind the whole device once
                    // and stop scanning.
                    if let Some(name) = self.just_physical_device_name() {
                        log::info!("{} exposes no partition nodes, using {}", self.id, name);
                        self.create_physical_volume(ctx, &name);
                        handled_physical = true;
                        break;
                    }

                    let device = self.partition_device(part.index);
                    if part.is_known_mbr_type() {
                        self.create_public_volume(ctx, device);
                    } else if ctx.config.strict_mbr {
                        log::warn!("{} rejecting mbr type {:#04x}", self.id, mbr_type);
                    } else {
                        // Let the filesystem probe be authoritative.
                        log::warn!("{} unsupported mbr type {:#04x}", self.id, mbr_type);
                        self.create_public_volume(ctx, device);
                    }
                }
                PartKind::Gpt { type_guid } => {
                    if part.is_gpt_basic_data() {
                        let device = self.partition_device(part.index);
                        self.create_public_volume(ctx, device);
                    } else {
                        log::debug!("{} ignoring gpt type {}", self.id, type_guid);
                    }
                }
                PartKind::Bare => {}
            }
        }

        // Last ditch effort: maybe the entire disk is one filesystem.
        if !handled_physical && (dump.table == Table::Unknown || !dump.found_parts) {
            log::warn!("{} has unknown partition table; trying entire device", self.id);
            match probe_filesystem(ctx, &self.dev_path) {
                Ok(Some(_)) => {
                    if let Some(name) = self.just_physical_device_name() {
                        self.create_physical_volume(ctx, &name);
                    } else {
                        self.create_public_volume(ctx, self.device);
                    }
                }
                _ => log::warn!("{} failed to identify, giving up", self.id),
            }
        }

        self.notify(ctx, events::DISK_SCANNED, "");
        self.just_partitioned = false;
        Ok(())
    }

    /// Device numbers for partition `index`, normally minor-offset from the
    /// disk. Logical partitions past 15 get their own dynamically numbered
    /// devices; resolve those from the partition's sysfs node.
    fn partition_device(&self, index: u32) -> (u32, u32) {
        let device = (self.device.0, self.device.1 + index);
        if index <= 15 {
            return device;
        }
        let Some(name) = self.kernel_name() else {
            return device;
        };
        let node = self.sys_path.join(partition_dir_name(&name, index));
        match utils::sysfs_read_devno(&node) {
            Some(resolved) => resolved,
            None => device,
        }
    }

    fn kernel_name(&self) -> Option<String> {
        Some(self.sys_path.file_name()?.to_string_lossy().into_owned())
    }

    /// `Some(name)` when the kernel enumerated only the disk node, with no
    /// partition subdirectories beneath it.
    fn just_physical_device_name(&self) -> Option<String> {
        let name = self.kernel_name()?;
        let entries = self.sys_path.read_dir().ok()?;
        for entry in entries.flatten() {
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            if entry_name.len() > name.len()
                && entry_name.starts_with(&name)
                && entry.path().is_dir()
            {
                return None;
            }
        }
        Some(name)
    }

    fn create_public_volume(&mut self, ctx: &VoldContext, device: (u32, u32)) {
        let vol = Volume::new_public(device, &self.id, &self.sys_path, &ctx.paths.dev_dir);
        self.adopt_volume(ctx, vol);
    }

    fn create_physical_volume(&mut self, ctx: &VoldContext, dev_name: &str) {
        let vol = Volume::new_public_physical(
            dev_name,
            &self.id,
            &self.sys_path,
            &ctx.paths.dev_block_dir,
        );
        self.adopt_volume(ctx, vol);
    }

    fn adopt_volume(&mut self, ctx: &VoldContext, mut vol: Volume) {
        // A freshly partitioned slot needs a filesystem before the user
        // sees it; run the format pass silently and re-create for real.
        if self.just_partitioned {
            log::debug!("{} just partitioned; silently formatting", self.id);
            vol.set_silent(true);
            if let Err(e) = vol.create(ctx) {
                log::warn!("{} create failed: {}", vol.id(), e);
            }
            if let Err(e) = vol.format(ctx, "auto") {
                log::warn!("{} format failed: {}", vol.id(), e);
            }
            if let Err(e) = vol.destroy(ctx) {
                log::warn!("{} destroy failed: {}", vol.id(), e);
            }
            vol.set_silent(false);
        }

        self.volumes.push(vol);
        let vol = self.volumes.last_mut().unwrap();
        if let Err(e) = vol.create(ctx) {
            log::warn!("{} create failed: {}", vol.id(), e);
        }
    }
}

/// Kernel partition directory naming: `sda1`, but `mmcblk0p1` when the disk
/// name ends in a digit.
fn partition_dir_name(disk_name: &str, index: u32) -> String {
    if disk_name.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk_name, index)
    } else {
        format!("{}{}", disk_name, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::{test_context, RecordingBroadcaster, ScriptedExec};
    use crate::utils::CmdOutput;
    use std::fs;
    use std::sync::Arc;

    fn sgdisk_output(lines: &[&str]) -> CmdOutput {
        CmdOutput {
            status: 0,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn make_sysfs_disk(ctx: &crate::core::VoldContext, event_path: &str, parts: &[(&str, &str)]) {
        let node = ctx.paths.sys_root.join(event_path.trim_start_matches('/'));
        fs::create_dir_all(node.join("device")).unwrap();
        for (dir, devno) in parts {
            let part = node.join(dir);
            fs::create_dir_all(&part).unwrap();
            fs::write(part.join("dev"), devno).unwrap();
        }
    }

    const EVENT_PATH: &str = "/devices/platform/soc/usb1/host0/block/sdb";

    #[test]
    fn usb_stick_one_fat32_partition() {
        let exec = Arc::new(ScriptedExec::default());
        exec.on("sgdisk", sgdisk_output(&["DISK mbr", "PART 1 c"]));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec, broadcaster.clone());

        make_sysfs_disk(&ctx, EVENT_PATH, &[("sdb1", "8:17")]);
        fs::write(
            ctx.paths
                .sys_root
                .join(EVENT_PATH.trim_start_matches('/'))
                .join("device/vendor"),
            "Kingston\n",
        )
        .unwrap();

        let mut disk = Disk::new(EVENT_PATH, (8, 16), "usb", FLAG_USB, &ctx);
        disk.create(&ctx).unwrap();

        let codes = broadcaster.codes();
        assert_eq!(
            codes,
            vec![
                events::DISK_CREATED,
                events::DISK_SIZE_CHANGED,
                events::DISK_LABEL_CHANGED,
                events::DISK_SYS_PATH_CHANGED,
                events::VOLUME_CREATED,
                events::DISK_SCANNED,
            ]
        );
        let payloads = broadcaster.payloads();
        assert_eq!(payloads[0], format!("disk:8,16 {}", FLAG_USB));
        assert_eq!(payloads[2], "disk:8,16 Kingston");
        assert!(payloads[4].starts_with("public:8,17 "));
        assert_eq!(disk.volumes().len(), 1);
    }

    #[test]
    fn gpt_only_basic_data_creates_volume() {
        let exec = Arc::new(ScriptedExec::default());
        exec.on(
            "sgdisk",
            sgdisk_output(&[
                "DISK gpt",
                "PART 1 EBD0A0A2-B9E5-4433-87C0-68B6B72699C7 11111111-0000-0000-0000-000000000001",
                "PART 2 19A710A2-B3CA-11E4-B026-10604B889DCF 11111111-0000-0000-0000-000000000002",
            ]),
        );
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec, broadcaster.clone());

        make_sysfs_disk(&ctx, EVENT_PATH, &[("sdb1", "8:17"), ("sdb2", "8:18")]);
        fs::write(
            ctx.paths
                .sys_root
                .join(EVENT_PATH.trim_start_matches('/'))
                .join("device/vendor"),
            "Samsung\n",
        )
        .unwrap();

        let mut disk = Disk::new(EVENT_PATH, (8, 16), "usb", 0, &ctx);
        disk.create(&ctx).unwrap();

        assert_eq!(disk.volumes().len(), 1);
        assert_eq!(disk.volumes()[0].id(), "public:8,17");
    }

    #[test]
    fn unknown_table_falls_back_to_whole_disk() {
        let exec = Arc::new(ScriptedExec::default());
        exec.on("sgdisk", sgdisk_output(&[]));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec.clone(), broadcaster.clone());

        // Stale partition directory keeps the disk off the physical-only
        // path; blkid sees ext4 across the whole device.
        make_sysfs_disk(&ctx, EVENT_PATH, &[("sdb1", "8:17")]);
        fs::write(
            ctx.paths
                .sys_root
                .join(EVENT_PATH.trim_start_matches('/'))
                .join("device/vendor"),
            "Generic\n",
        )
        .unwrap();

        let mut disk = Disk::new(EVENT_PATH, (8, 16), "usb", 0, &ctx);
        let dev_path = disk.dev_path().display().to_string();
        exec.on(
            "blkid",
            CmdOutput {
                status: 0,
                lines: vec![format!(r#"{}: UUID="abcd-1234" TYPE="ext4""#, dev_path)],
            },
        );
        disk.create(&ctx).unwrap();

        assert_eq!(disk.volumes().len(), 1);
        assert_eq!(disk.volumes()[0].id(), "public:8,16");
    }

    #[test]
    fn just_physical_device_binds_kernel_node() {
        let exec = Arc::new(ScriptedExec::default());
        exec.on("sgdisk", sgdisk_output(&["DISK mbr", "PART 1 c"]));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec, broadcaster.clone());

        // No partition subdirectories at all.
        make_sysfs_disk(&ctx, EVENT_PATH, &[]);
        fs::write(
            ctx.paths
                .sys_root
                .join(EVENT_PATH.trim_start_matches('/'))
                .join("device/vendor"),
            "Kingston\n",
        )
        .unwrap();

        let mut disk = Disk::new(EVENT_PATH, (8, 16), "usb", 0, &ctx);
        disk.create(&ctx).unwrap();

        assert_eq!(disk.volumes().len(), 1);
        assert_eq!(disk.volumes()[0].id(), "sdb");
    }

    #[test]
    fn just_partitioned_runs_silent_format_cycle() {
        let exec = Arc::new(ScriptedExec::default());
        exec.on("sgdisk", sgdisk_output(&["DISK mbr", "PART 1 c"]));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec.clone(), broadcaster.clone());

        // Card-reader layout: one PART record but no partition nodes, so
        // the scan binds the kernel device name.
        make_sysfs_disk(&ctx, EVENT_PATH, &[]);
        fs::write(
            ctx.paths
                .sys_root
                .join(EVENT_PATH.trim_start_matches('/'))
                .join("device/vendor"),
            "Kingston\n",
        )
        .unwrap();

        let mut disk = Disk::new(EVENT_PATH, (8, 16), "usb", 0, &ctx);
        disk.set_just_partitioned(true);
        disk.create(&ctx).unwrap();

        // The silent pass emitted nothing; one visible VolumeCreated.
        let created: Vec<_> = broadcaster
            .codes()
            .into_iter()
            .filter(|c| *c == events::VOLUME_CREATED)
            .collect();
        assert_eq!(created.len(), 1);
        assert!(exec
            .calls()
            .iter()
            .any(|call| call.contains("newfs_msdos")));
    }

    #[test]
    fn destroy_tears_down_volumes_before_disk() {
        let exec = Arc::new(ScriptedExec::default());
        exec.on("sgdisk", sgdisk_output(&["DISK mbr", "PART 1 c"]));
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec, broadcaster.clone());

        make_sysfs_disk(&ctx, EVENT_PATH, &[("sdb1", "8:17")]);
        fs::write(
            ctx.paths
                .sys_root
                .join(EVENT_PATH.trim_start_matches('/'))
                .join("device/vendor"),
            "Kingston\n",
        )
        .unwrap();

        let mut disk = Disk::new(EVENT_PATH, (8, 16), "usb", 0, &ctx);
        disk.create(&ctx).unwrap();
        disk.destroy(&ctx).unwrap();

        let codes = broadcaster.codes();
        let vol_destroyed = codes
            .iter()
            .position(|c| *c == events::VOLUME_DESTROYED)
            .unwrap();
        let disk_destroyed = codes
            .iter()
            .position(|c| *c == events::DISK_DESTROYED)
            .unwrap();
        assert!(vol_destroyed < disk_destroyed);
        assert!(!disk.created());
    }

    #[test]
    fn mmc_label_from_manfid() {
        let exec = Arc::new(ScriptedExec::default());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec, broadcaster.clone());

        let event_path = "/devices/platform/mmc0/block/mmcblk0";
        make_sysfs_disk(&ctx, event_path, &[]);
        let node = ctx.paths.sys_root.join(event_path.trim_start_matches('/'));
        fs::write(node.join("device/manfid"), "0x000003\n").unwrap();

        let mut disk = Disk::new(event_path, (179, 0), "sdcard", FLAG_SD, &ctx);
        disk.read_metadata(&ctx).unwrap();
        assert_eq!(disk.label(), "SanDisk");
    }

    #[test]
    fn unsupported_major_fails_probe() {
        let exec = Arc::new(ScriptedExec::default());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec, broadcaster.clone());

        make_sysfs_disk(&ctx, "/devices/virtual/block/weird0", &[]);
        let mut disk = Disk::new("/devices/virtual/block/weird0", (250, 0), "weird", 0, &ctx);
        let err = disk.read_metadata(&ctx).unwrap_err();
        assert!(matches!(err, VoldError::Unsupported(_)));
        assert!(broadcaster.codes().is_empty());
    }

    #[test]
    fn srdisk_skips_scan_on_create() {
        let exec = Arc::new(ScriptedExec::default());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let ctx = test_context(exec.clone(), broadcaster.clone());

        let mut disk = Disk::new("/devices/platform/ide0/block/sr0", (11, 0), "sr0", 0, &ctx);
        disk.create(&ctx).unwrap();

        assert_eq!(broadcaster.codes(), vec![events::DISK_CREATED]);
        assert!(exec.calls().is_empty());
        assert!(disk.volumes().is_empty());

        // Media insertion scans the fake whole-disc partition.
        disk.read_partitions(&ctx).unwrap();
        assert_eq!(disk.volumes().len(), 1);
        assert_eq!(disk.volumes()[0].id(), "public:11,0");
    }

    #[test]
    fn partition_names_for_digit_suffixed_disks() {
        assert_eq!(partition_dir_name("sdb", 1), "sdb1");
        assert_eq!(partition_dir_name("mmcblk0", 17), "mmcblk0p17");
    }
}
