// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod commands;
pub mod disk;
pub mod error;
pub mod events;
pub mod manager;
pub mod scanner;
pub mod socket;
pub mod volume;

use std::path::PathBuf;
use std::sync::Arc;

use self::events::Broadcaster;
use crate::conf::config::Config;
use crate::defs;
use crate::utils::Exec;

/// SELinux contexts handed to helper subprocesses, one trusted/untrusted
/// pair each for blkid and fsck.
#[derive(Debug, Clone)]
pub struct HelperContexts {
    /// Trusted contexts cover adopted storage; nothing public uses them yet.
    #[allow(dead_code)]
    pub blkid: String,
    pub blkid_untrusted: String,
    #[allow(dead_code)]
    pub fsck: String,
    pub fsck_untrusted: String,
}

/// Filesystem roots the daemon works under. Production uses the well-known
/// system locations; tests relocate everything under a scratch directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// sysfs mount point.
    pub sys_root: PathBuf,
    /// Directory for our own device nodes.
    pub dev_dir: PathBuf,
    /// Kernel-populated /dev/block, for physical-name volumes.
    pub dev_block_dir: PathBuf,
    /// Mount point parent.
    pub media_dir: PathBuf,
}

impl Paths {
    pub fn system() -> Paths {
        Paths {
            sys_root: PathBuf::from(defs::SYSFS_ROOT),
            dev_dir: PathBuf::from(defs::VOLD_DEV_DIR),
            dev_block_dir: PathBuf::from(defs::DEV_BLOCK_DIR),
            media_dir: PathBuf::from(defs::MEDIA_RW_DIR),
        }
    }
}

/// Everything a disk or volume operation needs besides its own state:
/// the subprocess seam, the event sink and the immutable daemon setup.
pub struct VoldContext {
    pub exec: Arc<dyn Exec>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub config: Config,
    pub contexts: HelperContexts,
    pub paths: Paths,
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::utils::CmdOutput;

    static COUNTER: AtomicU64 = AtomicU64::new(1);

    /// Captures broadcasts in order for sequence assertions.
    #[derive(Default)]
    pub struct RecordingBroadcaster {
        events: Mutex<Vec<(u32, String)>>,
    }

    impl RecordingBroadcaster {
        pub fn codes(&self) -> Vec<u32> {
            self.events.lock().unwrap().iter().map(|(c, _)| *c).collect()
        }

        pub fn payloads(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, p)| p.clone())
                .collect()
        }

        pub fn events(&self) -> Vec<(u32, String)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Broadcaster for RecordingBroadcaster {
        fn broadcast(&self, code: u32, payload: &str) {
            self.events.lock().unwrap().push((code, payload.to_owned()));
        }
    }

    /// Replays recorded helper outputs: the first rule whose pattern occurs
    /// in `bin + args` wins. Unmatched helpers succeed with empty output.
    #[derive(Default)]
    pub struct ScriptedExec {
        rules: Mutex<Vec<(String, CmdOutput)>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExec {
        pub fn on(&self, pattern: &str, output: CmdOutput) {
            self.rules.lock().unwrap().push((pattern.to_owned(), output));
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Exec for ScriptedExec {
        fn run(&self, bin: &str, args: &[&str]) -> io::Result<CmdOutput> {
            let invocation = format!("{} {}", bin, args.join(" "));
            self.calls.lock().unwrap().push(invocation.clone());
            for (pattern, output) in self.rules.lock().unwrap().iter() {
                if invocation.contains(pattern.as_str()) {
                    return Ok(output.clone());
                }
            }
            Ok(CmdOutput {
                status: 0,
                lines: Vec::new(),
            })
        }
    }

    /// A context rooted in a fresh scratch directory; the directory is not
    /// cleaned up eagerly, tests that care use their own guard.
    pub fn test_context(
        exec: Arc<dyn Exec>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> VoldContext {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!("droidvold-test-{}-{}", std::process::id(), unique));
        let paths = Paths {
            sys_root: root.join("sys"),
            dev_dir: root.join("dev/block/droidvold"),
            dev_block_dir: root.join("dev/block"),
            media_dir: root.join("mnt/media_rw"),
        };
        std::fs::create_dir_all(&paths.sys_root).unwrap();
        std::fs::create_dir_all(&paths.dev_dir).unwrap();
        std::fs::create_dir_all(&paths.media_dir).unwrap();

        VoldContext {
            exec,
            broadcaster,
            config: Config::default(),
            contexts: HelperContexts {
                blkid: "u:r:blkid:s0".into(),
                blkid_untrusted: "u:r:blkid_untrusted:s0".into(),
                fsck: "u:r:fsck:s0".into(),
                fsck_untrusted: "u:r:fsck_untrusted:s0".into(),
            },
            paths,
        }
    }
}
