//! Run loop terminal errors
//!
//! Construction failures go through `anyhow` with context; once the loop is
//! running, every way out is one of these and maps to a process exit code.

use std::collections::TryReserveError;

use nix::errno::Errno;
use thiserror::Error;

use crate::constants::{EXIT_NORMAL, EXIT_POLL_FAILURE, EXIT_SEND_FAILURE, EXIT_TRANSPORT_FAILURE};

/// Fatal condition observed by the run loop
#[derive(Debug, Error)]
pub enum Fatal {
    /// Blocking wait failed with something other than EINTR
    #[error("poll failed: {0}")]
    Poll(#[from] Errno),

    /// Pollable array could not be allocated
    #[error("poll registry allocation failed: {0}")]
    Registry(#[from] TryReserveError),

    /// Bus message could not be created or delivered, or the connection dropped
    #[error("bus transport error: {0}")]
    Transport(String),

    /// Gesture signal could not be created or queued
    #[error("gesture signal send failed: {0}")]
    Send(String),
}

impl Fatal {
    pub fn exit_code(&self) -> i32 {
        match self {
            Fatal::Poll(_) | Fatal::Registry(_) => EXIT_POLL_FAILURE,
            Fatal::Transport(_) => EXIT_TRANSPORT_FAILURE,
            Fatal::Send(_) => EXIT_SEND_FAILURE,
        }
    }
}

/// How the run loop ended
#[derive(Debug)]
pub enum ExitStatus {
    /// Idle expiry or shutdown signal
    Normal,
    Failed(Fatal),
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Normal => EXIT_NORMAL,
            ExitStatus::Failed(fatal) => fatal.exit_code(),
        }
    }
}
