//! Construction and spawning of worker processes.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use depotdl_core::request::WorkerRequest;
use depotdl_core::{WorkerError, marshal};
use tokio::process::{Child, Command};

/// Argv sentinel that marks a process as a worker invocation.
pub const WORKER_SENTINEL: &str = "__depotdl-worker";

/// How a worker process is launched.
///
/// The worker's argv contract is `[...args, request, parent-pid]` where
/// `request` is the marshalled [`WorkerRequest`]. Self-executing hosts put
/// [`WORKER_SENTINEL`] first so [`crate::run_if_worker`] can recognize the
/// invocation.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// Re-execute the current binary as the worker.
    ///
    /// The host's `main` must call [`crate::run_if_worker`] before doing
    /// anything else, otherwise the spawned copy runs the host again.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec![OsString::from(WORKER_SENTINEL)],
        })
    }

    /// Launch a dedicated worker program instead of re-executing.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument ahead of the request payload.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments ahead of the request payload.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Spawn the worker for `request`.
    ///
    /// All three standard streams are piped. On Unix the worker becomes the
    /// leader of a fresh process group so the whole tree can be signalled
    /// at once.
    pub(crate) fn spawn(&self, request: &WorkerRequest) -> Result<Child, WorkerError> {
        let wire = marshal::to_wire(request)?;
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(wire)
            .arg(std::process::id().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command.spawn().map_err(WorkerError::Spawn)
    }
}

// ============================================================================
// Tests
// ============================================================================
