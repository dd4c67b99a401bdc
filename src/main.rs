// droidvold/src/main.rs
mod conf;
mod core;
mod defs;
mod mount;
mod uevent;
mod utils;

use std::fs;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;

use crate::conf::{
    cli::{Cli, Commands},
    config::Config,
};
use crate::core::disk::{FLAG_ADOPTABLE, FLAG_DEFAULT_PRIMARY};
use crate::core::manager::{DiskSource, VolumeManager};
use crate::core::socket::ClientRegistry;
use crate::core::{socket, HelperContexts, Paths, VoldContext};
use crate::utils::SystemExec;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(config_path) = &cli.config {
        return Config::from_file(config_path);
    }
    match Config::load_default() {
        Ok(config) => Ok(config),
        Err(e) => {
            if Path::new(defs::CONFIG_FILE_DEFAULT).exists() {
                log::error!("Error loading config: {:#}", e);
            }
            Ok(Config::default())
        }
    }
}

/// Lets the kernel poll removable media for presence changes.
fn set_media_poll_time() {
    if let Err(e) = fs::write(defs::SYSFS_MEDIA_POLL_MSECS, "2000") {
        log::error!("kernel does not support media poll uevents: {}", e);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::GenConfig { output }) = &cli.command {
        Config::default().save_to_file(output)?;
        return Ok(());
    }

    utils::init_logger(cli.verbose, &cli.log_file)?;

    log::info!("droidvold 1.0 firing up");

    let config = load_config(&cli)?;

    utils::ensure_dir_exists(defs::VOLD_DEV_DIR)
        .with_context(|| format!("Unable to create {}", defs::VOLD_DEV_DIR))?;

    let sources = config.sources.clone();

    let registry = Arc::new(ClientRegistry::new());
    let ctx = VoldContext {
        exec: Arc::new(SystemExec),
        broadcaster: registry.clone(),
        config,
        contexts: HelperContexts {
            blkid: cli.blkid_context.clone(),
            blkid_untrusted: cli.blkid_untrusted_context.clone(),
            fsck: cli.fsck_context.clone(),
            fsck_untrusted: cli.fsck_untrusted_context.clone(),
        },
        paths: Paths::system(),
    };

    let mut vm = VolumeManager::new(ctx);
    for source in &sources {
        let mut flags = 0;
        if source.adoptable {
            flags |= FLAG_ADOPTABLE;
        }
        if source.default_primary {
            flags |= FLAG_DEFAULT_PRIMARY;
        }
        vm.add_disk_source(DiskSource::new(&source.sys_pattern, &source.nickname, flags));
    }
    let vm = Arc::new(Mutex::new(vm));

    // Order matters at startup: the uevent socket must exist before the
    // coldboot replay or we would miss our own triggers.
    let netlink = uevent::open_socket().context("Unable to start uevent reader")?;

    let _ = fs::remove_file(&cli.socket);
    let listener =
        UnixListener::bind(&cli.socket).context("Unable to bind control socket")?;

    {
        let vm = vm.clone();
        uevent::spawn_reader(netlink, move |event| {
            vm.lock().unwrap().handle_block_event(&event);
        });
    }

    set_media_poll_time();
    uevent::coldboot(Path::new(defs::SYSFS_BLOCK_DIR));

    // Now that we're up, we can respond to commands.
    socket::serve(listener, vm, registry)?;
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("droidvold exiting: {:#}", e);
        eprintln!("droidvold: {:#}", e);
        std::process::exit(1);
    }
}
