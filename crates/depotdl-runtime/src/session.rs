//! One supervised worker run: stream multiplexing, control dispatch, exit.
//!
//! A [`WorkerSession`] owns the child process and its three pipes. The
//! session classifies every stdout line through the control codec, relays
//! authentication challenges over the bridge, keeps the single return-value
//! slot, and turns the exit status into a [`Termination`] once both streams
//! have drained. Both public consumption shapes in [`crate::runner`] drive
//! this same type, so their semantics cannot diverge.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use depotdl_core::ports::Authenticator;
use depotdl_core::protocol::{ControlMessage, try_decode};
use depotdl_core::request::WorkerRequest;
use depotdl_core::{OutputLine, WorkerError, exit_code};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge;
use crate::command::WorkerCommand;
use crate::shutdown;

// ============================================================================
// Types
// ============================================================================

/// Exit record of a finished worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Termination {
    /// Raw exit code; a signal death on Unix reports as `128 + signo`.
    pub exit_code: i32,
    /// Wire form of the last `set-return-value` payload, if any arrived.
    pub return_value: Option<String>,
}

/// A spawned worker plus everything needed to supervise it.
///
/// The session never outlives its worker: every exit path, including
/// dropping a half-consumed session, ends with the worker's process tree
/// dead.
pub(crate) struct WorkerSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Lines<BufReader<ChildStderr>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    cancel: CancellationToken,
    return_value: Option<String>,
    stdout_open: bool,
    stderr_open: bool,
    finished: bool,
}

impl WorkerSession {
    /// Spawn the worker for `request` and wire up its streams.
    pub(crate) fn spawn(
        command: &WorkerCommand,
        request: &WorkerRequest,
        authenticator: Option<Arc<dyn Authenticator>>,
        cancel: CancellationToken,
    ) -> Result<Self, WorkerError> {
        let mut child = command.spawn(request)?;
        let stdin = take_pipe(child.stdin.take(), "stdin")?;
        let stdout = take_pipe(child.stdout.take(), "stdout")?;
        let stderr = take_pipe(child.stderr.take(), "stderr")?;
        debug!(pid = ?child.id(), "worker spawned");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr: BufReader::new(stderr).lines(),
            authenticator,
            cancel,
            return_value: None,
            stdout_open: true,
            stderr_open: true,
            finished: false,
        })
    }

    /// Next line to surface to the caller.
    ///
    /// Reads both streams concurrently; `next_line` is cancel-safe, so no
    /// partial line is ever lost to the select. Control messages on stdout
    /// are consumed here instead of surfaced: authentication verbs block on
    /// the bridge, return values fill the slot (last write wins). Lines with
    /// the control prefix that fail to decode are logged and surfaced as
    /// ordinary output.
    ///
    /// Returns `Ok(None)` once both streams reached end of file, which is
    /// the signal to call [`WorkerSession::finish`]. Cancellation kills the
    /// worker tree and surfaces as [`WorkerError::Cancelled`].
    pub(crate) async fn next_output(&mut self) -> Result<Option<OutputLine>, WorkerError> {
        loop {
            if !self.stdout_open && !self.stderr_open {
                return Ok(None);
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.kill().await?;
                    return Err(WorkerError::Cancelled);
                }

                line = self.stdout.next_line(), if self.stdout_open => {
                    match line? {
                        Some(line) => {
                            if let Some(output) = self.classify_stdout(line).await? {
                                return Ok(Some(output));
                            }
                        }
                        None => self.stdout_open = false,
                    }
                }

                line = self.stderr.next_line(), if self.stderr_open => {
                    match line? {
                        // Never decoded: stderr cannot carry control traffic.
                        Some(line) => return Ok(Some(OutputLine::stderr(line))),
                        None => self.stderr_open = false,
                    }
                }
            }
        }
    }

    /// Wait for the worker to exit and collect its [`Termination`].
    ///
    /// Must only be called after [`WorkerSession::next_output`] returned
    /// `Ok(None)`; draining both streams first is what guarantees a return
    /// value emitted just before exit is already in the slot.
    pub(crate) async fn finish(&mut self) -> Result<Termination, WorkerError> {
        let status = tokio::select! {
            () = self.cancel.cancelled() => {
                self.kill().await?;
                return Err(WorkerError::Cancelled);
            }
            status = self.child.wait() => status?,
        };
        self.finished = true;

        let exit_code = exit_code_of(status);
        debug!(exit_code, "worker exited");
        Ok(Termination {
            exit_code,
            return_value: self.return_value.take(),
        })
    }

    /// Decode one stdout line; `None` means it was control traffic.
    async fn classify_stdout(&mut self, line: String) -> Result<Option<OutputLine>, WorkerError> {
        match try_decode(&line) {
            Ok(None) => Ok(Some(OutputLine::stdout(line))),
            Ok(Some(ControlMessage::ReturnValue { payload })) => {
                debug!("worker delivered a return value");
                self.return_value = Some(payload);
                Ok(None)
            }
            Ok(Some(challenge)) => {
                self.answer_challenge(&challenge).await?;
                Ok(None)
            }
            Err(error) => {
                // Malformed control traffic never acts; surface it verbatim.
                warn!(%error, "discarding malformed control line");
                Ok(Some(OutputLine::stdout(line)))
            }
        }
    }

    async fn answer_challenge(&mut self, challenge: &ControlMessage) -> Result<(), WorkerError> {
        let Some(authenticator) = self.authenticator.as_deref() else {
            return Err(WorkerError::protocol(
                "worker requested interactive authentication but no authenticator is configured",
            ));
        };
        bridge::respond(challenge, authenticator, &mut self.stdin).await
    }

    async fn kill(&mut self) -> Result<(), io::Error> {
        shutdown::terminate(&mut self.child).await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // kill_on_drop reaps the worker itself; the group signal reaches
        // anything the worker spawned.
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            shutdown::kill_group(pid);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn take_pipe<T>(pipe: Option<T>, name: &str) -> Result<T, WorkerError> {
    pipe.ok_or_else(|| WorkerError::Spawn(io::Error::other(format!("worker {name} not piped"))))
}

fn exit_code_of(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(exit_code::UNKNOWN_ERROR)
}

// ============================================================================
// Tests
// ============================================================================
