// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Kernel hot-plug notifications: netlink uevent reader and the coldboot
//! replay that re-announces devices present before the daemon started.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    os::fd::{AsRawFd, OwnedFd},
    path::Path,
    thread::{self, JoinHandle},
};

use nix::sys::socket::{
    bind, recv, socket, AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    Change,
    Other,
}

impl Action {
    fn parse(raw: &str) -> Action {
        match raw {
            "add" => Action::Add,
            "remove" => Action::Remove,
            "change" => Action::Change,
            _ => Action::Other,
        }
    }
}

/// One decoded kernel uevent.
#[derive(Debug, Clone)]
pub struct UEvent {
    pub action: Action,
    pub devpath: String,
    pub subsystem: String,
    pub devtype: String,
    pub major: Option<u32>,
    pub minor: Option<u32>,
}

impl UEvent {
    /// Decodes the kernel's NUL-separated `KEY=value` block. The leading
    /// `action@devpath` summary line is redundant and skipped.
    pub fn parse(buf: &[u8]) -> Option<UEvent> {
        let mut action = None;
        let mut devpath = None;
        let mut subsystem = None;
        let mut devtype = String::new();
        let mut major = None;
        let mut minor = None;

        for field in buf.split(|b| *b == 0) {
            let Ok(field) = std::str::from_utf8(field) else {
                continue;
            };
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            match key {
                "ACTION" => action = Some(Action::parse(value)),
                "DEVPATH" => devpath = Some(value.to_owned()),
                "SUBSYSTEM" => subsystem = Some(value.to_owned()),
                "DEVTYPE" => devtype = value.to_owned(),
                "MAJOR" => major = value.parse().ok(),
                "MINOR" => minor = value.parse().ok(),
                _ => {}
            }
        }

        Some(UEvent {
            action: action?,
            devpath: devpath?,
            subsystem: subsystem?,
            devtype,
            major,
            minor,
        })
    }

    pub fn is_block_disk(&self) -> bool {
        self.subsystem == "block" && self.devtype == "disk"
    }
}

/// Opens the kernel uevent netlink socket. Failing here is a startup-fatal
/// condition for the daemon.
pub fn open_socket() -> io::Result<OwnedFd> {
    let fd = socket(
        AddressFamily::Netlink,
        SockType::Raw,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::NetlinkKObjectUEvent,
    )
    .map_err(io::Error::from)?;

    // Group 1 carries the kernel's own uevents.
    let addr = NetlinkAddr::new(std::process::id(), 1);
    bind(fd.as_raw_fd(), &addr).map_err(io::Error::from)?;
    Ok(fd)
}

/// Drains the netlink socket forever, handing each decoded event to `sink`.
pub fn spawn_reader<F>(fd: OwnedFd, mut sink: F) -> JoinHandle<()>
where
    F: FnMut(UEvent) + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match recv(fd.as_raw_fd(), &mut buf, MsgFlags::empty()) {
                Ok(0) => break,
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    log::error!("uevent recv failed: {}", e);
                    break;
                }
            };
            if let Some(event) = UEvent::parse(&buf[..n]) {
                sink(event);
            }
        }
    })
}

/// Walks `path` writing `add` into every uevent file so devices that were
/// present before startup are announced again.
pub fn coldboot(path: &Path) {
    coldboot_dir(path, 0);
}

fn coldboot_dir(dir: &Path, depth: usize) {
    if depth > 4 {
        return;
    }

    let trigger = dir.join("uevent");
    if let Ok(mut f) = OpenOptions::new().write(true).open(trigger) {
        let _ = f.write_all(b"add\n");
    }

    let Ok(entries) = dir.read_dir() else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        // Follows the /sys/block symlinks into the device directories.
        if path.is_dir() {
            coldboot_dir(&path, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(fields: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for f in fields {
            buf.extend_from_slice(f.as_bytes());
            buf.push(0);
        }
        buf
    }

    #[test]
    fn parses_block_add() {
        let buf = raw(&[
            "add@/devices/pci0000:00/usb1/1-1/host6/target6:0:0/6:0:0:0/block/sdb",
            "ACTION=add",
            "DEVPATH=/devices/pci0000:00/usb1/1-1/host6/target6:0:0/6:0:0:0/block/sdb",
            "SUBSYSTEM=block",
            "MAJOR=8",
            "MINOR=16",
            "DEVNAME=sdb",
            "DEVTYPE=disk",
            "SEQNUM=2765",
        ]);
        let ev = UEvent::parse(&buf).unwrap();
        assert_eq!(ev.action, Action::Add);
        assert_eq!(ev.major, Some(8));
        assert_eq!(ev.minor, Some(16));
        assert!(ev.is_block_disk());
    }

    #[test]
    fn partition_events_are_not_disks() {
        let buf = raw(&[
            "ACTION=add",
            "DEVPATH=/devices/virtual/block/sdb/sdb1",
            "SUBSYSTEM=block",
            "DEVTYPE=partition",
            "MAJOR=8",
            "MINOR=17",
        ]);
        let ev = UEvent::parse(&buf).unwrap();
        assert!(!ev.is_block_disk());
    }

    #[test]
    fn missing_action_is_rejected() {
        let buf = raw(&["DEVPATH=/devices/x", "SUBSYSTEM=block"]);
        assert!(UEvent::parse(&buf).is_none());
    }
}
