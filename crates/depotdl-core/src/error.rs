//! The caller-visible error taxonomy and the worker exit-code contract.

use std::io;

use thiserror::Error;

use crate::marshal::MarshalError;

/// Exit codes a worker process reports back through its exit status.
///
/// Any other nonzero code is treated as [`exit_code::UNKNOWN_ERROR`].
pub mod exit_code {
    /// Worker completed its request.
    pub const SUCCESS: i32 = 0;

    /// Unclassified failure, including worker panics.
    pub const UNKNOWN_ERROR: i32 = 1;

    /// The download itself failed.
    pub const DOWNLOAD_ERROR: i32 = 2;

    /// Logging in to the content backend failed.
    pub const LOGIN_ERROR: i32 = 3;
}

/// Errors surfaced by a worker run.
///
/// The first three variants mirror the worker exit-code taxonomy; the rest
/// describe supervisor-side failures around the worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker failed with an unknown error (exit code {code})")]
    Unknown { code: i32 },

    #[error("download failed")]
    Download,

    #[error("login failed")]
    Login,

    #[error("operation was cancelled")]
    Cancelled,

    /// The worker violated the control-channel contract, for example by
    /// requesting interactive authentication when none was configured, or
    /// by exiting successfully without a promised return value.
    #[error("worker broke the control protocol: {0}")]
    Protocol(String),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The caller-supplied authenticator failed to produce an answer.
    #[error("authenticator failed: {0}")]
    Authenticator(anyhow::Error),
}

impl WorkerError {
    /// Map a nonzero worker exit code to its error.
    pub const fn from_exit_code(code: i32) -> Self {
        match code {
            exit_code::DOWNLOAD_ERROR => Self::Download,
            exit_code::LOGIN_ERROR => Self::Login,
            _ => Self::Unknown { code },
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// The worker exit code behind this error, if it came from one.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Unknown { code } => Some(*code),
            Self::Download => Some(exit_code::DOWNLOAD_ERROR),
            Self::Login => Some(exit_code::LOGIN_ERROR),
            _ => None,
        }
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ============================================================================
// Tests
// ============================================================================
