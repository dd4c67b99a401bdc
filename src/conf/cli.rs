// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::defs::{CONFIG_FILE_DEFAULT, LOG_FILE_DEFAULT, SOCKET_PATH_DEFAULT};

#[derive(Parser, Debug)]
#[command(name = "droidvold", version, about = "Removable-storage volume manager")]

pub struct Cli {
    /// SELinux context for trusted blkid invocations.
    #[arg(long = "blkid_context")]
    pub blkid_context: String,
    /// SELinux context for blkid against untrusted (user-inserted) media.
    #[arg(long = "blkid_untrusted_context")]
    pub blkid_untrusted_context: String,
    /// SELinux context for trusted fsck invocations.
    #[arg(long = "fsck_context")]
    pub fsck_context: String,
    /// SELinux context for fsck against untrusted media.
    #[arg(long = "fsck_untrusted_context")]
    pub fsck_untrusted_context: String,
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    #[arg(long = "socket", default_value = SOCKET_PATH_DEFAULT)]
    pub socket: PathBuf,
    #[arg(long = "log-file", default_value = LOG_FILE_DEFAULT)]
    pub log_file: PathBuf,
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]

pub enum Commands {
    /// Write a default configuration and exit.
    GenConfig {
        #[arg(short = 'o', long = "output", default_value = CONFIG_FILE_DEFAULT)]
        output: PathBuf,
    },
}
