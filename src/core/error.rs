// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io;

use thiserror::Error;

/// Failure taxonomy for disk and volume operations.
///
/// Each kind maps onto one response class at the command layer; the state
/// machines use the kind to decide how far to roll back.
#[derive(Debug, Error)]
pub enum VoldError {
    /// Malformed command or a reference to an object that does not exist.
    #[error("{0}")]
    Syntax(String),

    /// Unknown block major or a filesystem we cannot handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Helper subprocess or syscall failure; the operation may be retried.
    #[error("transient: {0}")]
    TransientIo(String),

    /// Mount target already in use; soft failure, no state change.
    #[error("already mounted: {0}")]
    Already(String),

    /// The single loop slot is occupied.
    #[error("loop slot busy")]
    Busy,

    /// Operation not legal in the current state.
    #[error("invalid state: {0}")]
    State(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VoldError>;

impl VoldError {
    /// Raw errno carried by the failure, for the errno-coded loop responses.
    pub fn errno(&self) -> i32 {
        match self {
            VoldError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            VoldError::Busy => libc::EBUSY,
            VoldError::Already(_) => libc::EBUSY,
            VoldError::Unsupported(_) => libc::ENOTSUP,
            _ => libc::EIO,
        }
    }
}
