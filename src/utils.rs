// droidvold/src/utils.rs
use std::{
    fs::{self, create_dir_all, File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    os::fd::AsRawFd,
    os::unix::fs::PermissionsExt,
    path::Path,
    process::Command,
    str::FromStr,
    sync::Mutex,
};

use anyhow::Result;
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use nix::unistd::{chown, Gid, Pid, Uid};
use procfs::process::FDTarget;
use rustix::mount::{unmount, UnmountFlags};

// --- File Logger Implementation ---
struct FileLogger {
    file: Mutex<Option<File>>,
}

impl log::Log for FileLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let line = format!(
                "[{}] [{}] {}",
                record.level(),
                record.target(),
                record.args()
            );
            let mut file = self.file.lock().unwrap();
            match file.as_mut() {
                Some(f) => {
                    let _ = writeln!(f, "{}", line);
                }
                None => eprintln!("{}", line),
            }
        }
    }

    fn flush(&self) {
        if let Some(f) = self.file.lock().unwrap().as_mut() {
            let _ = f.flush();
        }
    }
}

pub fn init_logger(verbose: bool, log_path: &Path) -> Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    if let Some(parent) = log_path.parent() {
        let _ = create_dir_all(parent);
    }

    // Fall back to stderr when the log file is not writable (recovery,
    // first boot before /data is up).
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .ok();

    let logger = Box::new(FileLogger {
        file: Mutex::new(file),
    });

    log::set_boxed_logger(logger)
        .map(|()| log::set_max_level(level))
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;

    Ok(())
}

// --- Subprocess seam ---

/// Captured result of a helper invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub status: i32,
    pub lines: Vec<String>,
}

impl CmdOutput {
    pub fn ok(&self) -> bool {
        self.status == 0
    }
}

/// Every external helper goes through this seam so tests can substitute
/// recorded outputs for specific argument patterns.
pub trait Exec: Send + Sync {
    fn run(&self, bin: &str, args: &[&str]) -> io::Result<CmdOutput>;

    /// Like [`Exec::run`] but executes the helper under the given SELinux
    /// context. Implementations without SELinux support may ignore it.
    fn run_with_context(&self, bin: &str, args: &[&str], con: &str) -> io::Result<CmdOutput> {
        let _ = con;
        self.run(bin, args)
    }
}

pub struct SystemExec;

impl SystemExec {
    fn capture(mut cmd: Command) -> io::Result<CmdOutput> {
        let output = cmd.output()?;
        let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_owned)
            .collect();
        lines.extend(
            String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_owned),
        );
        Ok(CmdOutput {
            status: output.status.code().unwrap_or(-1),
            lines,
        })
    }
}

impl Exec for SystemExec {
    fn run(&self, bin: &str, args: &[&str]) -> io::Result<CmdOutput> {
        log::debug!("exec {} {:?}", bin, args);
        let mut cmd = Command::new(bin);
        cmd.args(args);
        Self::capture(cmd)
    }

    fn run_with_context(&self, bin: &str, args: &[&str], con: &str) -> io::Result<CmdOutput> {
        use std::os::unix::process::CommandExt;

        log::debug!("exec [{}] {} {:?}", con, bin, args);
        let mut cmd = Command::new(bin);
        cmd.args(args);
        let con = con.to_owned();
        unsafe {
            cmd.pre_exec(move || {
                // setexeccon: the child picks the context up at execve.
                fs::write("/proc/thread-self/attr/exec", con.as_bytes())
            });
        }
        Self::capture(cmd)
    }
}

/// Runs a helper and treats a non-zero exit as an I/O error.
pub fn exec_checked(exec: &dyn Exec, bin: &str, args: &[&str]) -> io::Result<Vec<String>> {
    let out = exec.run(bin, args)?;
    if !out.ok() {
        return Err(io::Error::other(format!(
            "{} exited with status {}",
            bin, out.status
        )));
    }
    Ok(out.lines)
}

// --- sysfs ---

/// Reads a value from a sysfs attribute and parses it, `None` on any failure.
pub fn sysfs_read<T: FromStr>(node: &Path, key: &str) -> Option<T> {
    fs::read_to_string(node.join(key)).ok()?.trim().parse().ok()
}

/// Reads a sysfs `dev` attribute formatted as `major:minor`.
pub fn sysfs_read_devno(node: &Path) -> Option<(u32, u32)> {
    let raw: String = sysfs_read(node, "dev")?;
    let (maj, min) = raw.split_once(':')?;
    Some((maj.parse().ok()?, min.parse().ok()?))
}

// --- device nodes ---

pub fn create_device_node(path: &Path, major: u32, minor: u32) -> io::Result<()> {
    let dev = makedev(major as u64, minor as u64);
    match mknod(path, SFlag::S_IFBLK, Mode::from_bits_truncate(0o600), dev) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

pub fn destroy_device_node(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

// --- mount table ---

pub fn is_mountpoint_mounted(path: &Path) -> bool {
    let Ok(me) = procfs::process::Process::myself() else {
        return false;
    };
    let Ok(mounts) = me.mountinfo() else {
        return false;
    };
    mounts.0.iter().any(|m| m.mount_point == path)
}

/// Unmounts `path`, escalating to killing users and finally a lazy detach.
pub fn force_unmount(path: &Path) -> io::Result<()> {
    if unmount(path, UnmountFlags::empty()).is_ok() {
        return Ok(());
    }

    log::warn!("{} busy, killing users and retrying", path.display());
    kill_processes_using_path(path);

    if unmount(path, UnmountFlags::empty()).is_ok() {
        return Ok(());
    }

    unmount(path, UnmountFlags::DETACH).map_err(io::Error::from)
}

/// Lazy-detaches a stale mount without touching its users.
pub fn lazy_unmount(path: &Path) -> io::Result<()> {
    match unmount(path, UnmountFlags::DETACH) {
        Ok(()) => Ok(()),
        Err(rustix::io::Errno::INVAL) | Err(rustix::io::Errno::NOENT) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

/// Kills every process holding an open file, cwd or exe under `path`.
pub fn kill_processes_using_path(path: &Path) {
    let Ok(procs) = procfs::process::all_processes() else {
        return;
    };

    for proc in procs.flatten() {
        let pid = proc.pid();
        let mut uses = false;

        if let Ok(cwd) = proc.cwd() {
            uses |= cwd.starts_with(path);
        }
        if !uses {
            if let Ok(exe) = proc.exe() {
                uses |= exe.starts_with(path);
            }
        }
        if !uses {
            if let Ok(fds) = proc.fd() {
                for fd in fds.flatten() {
                    if let FDTarget::Path(p) = fd.target {
                        if p.starts_with(path) {
                            uses = true;
                            break;
                        }
                    }
                }
            }
        }

        if uses {
            log::info!("killing pid {} using {}", pid, path.display());
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
}

// --- directories ---

pub fn ensure_dir_exists<T: AsRef<Path>>(dir: T) -> io::Result<()> {
    if !dir.as_ref().exists() {
        log::debug!("Creating directory: {}", dir.as_ref().display());
        create_dir_all(&dir)?;
    }
    Ok(())
}

/// Creates `path` with the given mode and ownership, fixing up both when the
/// directory already exists.
pub fn prepare_dir(path: &Path, mode: u32, uid: u32, gid: u32) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir(path)?;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(io::Error::from)?;
    Ok(())
}

pub fn remove_dir_if_empty(path: &Path) {
    if let Err(e) = fs::remove_dir(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

// --- block devices ---

/// Major/minor of an existing block device node.
pub fn block_dev_numbers(path: &Path) -> io::Result<(u32, u32)> {
    let st = nix::sys::stat::stat(path).map_err(io::Error::from)?;
    let rdev = st.st_rdev;
    Ok((
        nix::sys::stat::major(rdev) as u32,
        nix::sys::stat::minor(rdev) as u32,
    ))
}

nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// Size of the block device in bytes, -1 when it cannot be read.
pub fn block_device_size(path: &Path) -> i64 {
    let Ok(f) = File::open(path) else {
        return -1;
    };
    let mut size: u64 = 0;
    match unsafe { blkgetsize64(f.as_raw_fd(), &mut size) } {
        Ok(_) => size as i64,
        Err(_) => -1,
    }
}

const WIPE_SPAN: usize = 1024 * 1024;

/// Zeroes the leading superblock region of a device before a format.
pub fn wipe_block_device(path: &Path) -> io::Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.seek(SeekFrom::Start(0))?;
    let zeros = vec![0u8; 64 * 1024];
    let mut left = WIPE_SPAN;
    while left > 0 {
        let n = left.min(zeros.len());
        if f.write(&zeros[..n])? == 0 {
            break;
        }
        left -= n;
    }
    f.flush()
}

// --- patterns ---

/// Matches `path` against a shell-style pattern where `*` spans any run of
/// characters. This is the subset fstab sysfs patterns use.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    fn inner(p: &[u8], s: &[u8]) -> bool {
        match (p.first(), s.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], s) || (!s.is_empty() && inner(p, &s[1..])),
            (Some(pc), Some(sc)) if pc == sc => inner(&p[1..], &s[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), path.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_star_spans_segments() {
        assert!(pattern_matches(
            "/devices/platform/soc/*/usb*",
            "/devices/platform/soc/11200000.usb/usb1"
        ));
        assert!(pattern_matches("*", "/devices/anything"));
        assert!(!pattern_matches(
            "/devices/platform/mmc*",
            "/devices/platform/usb/host0"
        ));
    }

    #[test]
    fn pattern_literal() {
        assert!(pattern_matches("/sys/block/sda", "/sys/block/sda"));
        assert!(!pattern_matches("/sys/block/sda", "/sys/block/sdb"));
    }

    #[test]
    fn devno_parse() {
        let dir = std::env::temp_dir().join("droidvold-devno-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("dev"), "8:16\n").unwrap();
        assert_eq!(sysfs_read_devno(&dir), Some((8, 16)));
        let _ = fs::remove_dir_all(&dir);
    }
}
