//! Public request façade: the two ways to consume a supervised worker run.
//!
//! The task shape runs the worker to completion, feeding output to optional
//! line handlers and resolving to the typed result. The stream shape yields
//! every surfaced line lazily as it arrives. Both drive the same
//! [`WorkerSession`], so line classification, authentication bridging, and
//! exit-code mapping cannot differ between them.

use std::io;
use std::sync::Arc;

use async_stream::stream;
use depotdl_core::ports::Authenticator;
use depotdl_core::request::{
    AppDownloadRequest, BuildIdRequest, PublishedFileRequest, UgcDownloadRequest, WorkerRequest,
};
use depotdl_core::{OutputLine, WorkerError, exit_code, marshal};
use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::command::WorkerCommand;
use crate::session::WorkerSession;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with each surfaced line of worker output.
pub type LineHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Per-call options for the task shape.
///
/// Without a cancellation token the run is bounded only by the worker
/// itself; there is no separate timeout.
#[derive(Default)]
pub struct RunOptions {
    /// Receives every informational (stdout) line.
    pub on_output: Option<LineHandler>,
    /// Receives every error (stderr) line.
    pub on_error: Option<LineHandler>,
    pub cancel: Option<CancellationToken>,
}

// ============================================================================
// Runner
// ============================================================================

/// Spawns and supervises one worker per request.
///
/// The runner itself is cheap and reusable; each call gets a fresh worker
/// process. An [`Authenticator`] must be attached whenever a request can
/// trigger interactive login — a challenge with no authenticator is a
/// [`WorkerError::Protocol`] failure.
pub struct WorkerRunner {
    command: WorkerCommand,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl WorkerRunner {
    /// Runner that re-executes the current binary as the worker.
    ///
    /// Requires the host's `main` to call [`crate::run_if_worker`] first.
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_command(WorkerCommand::current_exe()?))
    }

    /// Runner over an explicit worker command.
    pub fn with_command(command: WorkerCommand) -> Self {
        Self {
            command,
            authenticator: None,
        }
    }

    /// Attach the authenticator that answers interactive login challenges.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    // ------------------------------------------------------------------------
    // Task shape
    // ------------------------------------------------------------------------

    /// Download an app's depots, resolving once the worker finishes.
    pub async fn download_app(
        &self,
        request: &AppDownloadRequest,
        options: RunOptions,
    ) -> Result<(), WorkerError> {
        self.run_task(&WorkerRequest::DownloadApp(request.clone()), options)
            .await
            .map(|_| ())
    }

    /// Download a published workshop file.
    pub async fn download_published_file(
        &self,
        request: &PublishedFileRequest,
        options: RunOptions,
    ) -> Result<(), WorkerError> {
        self.run_task(
            &WorkerRequest::DownloadPublishedFile(request.clone()),
            options,
        )
        .await
        .map(|_| ())
    }

    /// Download a piece of user-generated content.
    pub async fn download_ugc(
        &self,
        request: &UgcDownloadRequest,
        options: RunOptions,
    ) -> Result<(), WorkerError> {
        self.run_task(&WorkerRequest::DownloadUgc(request.clone()), options)
            .await
            .map(|_| ())
    }

    /// Look up the current build id of an app branch.
    ///
    /// Resolves to the exact value the worker delivered. A worker that
    /// exits successfully without delivering one broke the contract.
    pub async fn app_build_id(
        &self,
        request: &BuildIdRequest,
        options: RunOptions,
    ) -> Result<u32, WorkerError> {
        let value = self
            .run_task(&WorkerRequest::AppBuildId(request.clone()), options)
            .await?;
        let wire = value.ok_or_else(|| {
            WorkerError::protocol("worker exited successfully without delivering a build id")
        })?;
        Ok(marshal::from_wire(&wire)?)
    }

    // ------------------------------------------------------------------------
    // Sequence shape
    // ------------------------------------------------------------------------

    /// Stream every surfaced output line of an app download.
    ///
    /// The stream is finite and non-restartable: it ends after the worker
    /// exits, with a final `Err` item carrying the mapped failure when the
    /// exit code was nonzero. Ending without an `Err` means success.
    /// Dropping the stream mid-run kills the worker.
    pub fn download_app_stream(
        &self,
        request: &AppDownloadRequest,
        cancel: Option<CancellationToken>,
    ) -> impl Stream<Item = Result<OutputLine, WorkerError>> + Send + use<> {
        self.run_stream(WorkerRequest::DownloadApp(request.clone()), cancel)
    }

    /// Stream every surfaced output line of a published-file download.
    pub fn download_published_file_stream(
        &self,
        request: &PublishedFileRequest,
        cancel: Option<CancellationToken>,
    ) -> impl Stream<Item = Result<OutputLine, WorkerError>> + Send + use<> {
        self.run_stream(WorkerRequest::DownloadPublishedFile(request.clone()), cancel)
    }

    /// Stream every surfaced output line of a UGC download.
    pub fn download_ugc_stream(
        &self,
        request: &UgcDownloadRequest,
        cancel: Option<CancellationToken>,
    ) -> impl Stream<Item = Result<OutputLine, WorkerError>> + Send + use<> {
        self.run_stream(WorkerRequest::DownloadUgc(request.clone()), cancel)
    }

    // ------------------------------------------------------------------------
    // Shared execution
    // ------------------------------------------------------------------------

    /// Run the worker to completion, returning the wire-form return value.
    async fn run_task(
        &self,
        request: &WorkerRequest,
        options: RunOptions,
    ) -> Result<Option<String>, WorkerError> {
        let cancel = options.cancel.unwrap_or_default();
        let mut session = WorkerSession::spawn(
            &self.command,
            request,
            self.authenticator.clone(),
            cancel,
        )?;

        while let Some(line) = session.next_output().await? {
            let handler = if line.is_error() {
                options.on_error.as_ref()
            } else {
                options.on_output.as_ref()
            };
            if let Some(handler) = handler {
                handler(&line.content);
            }
        }

        let termination = session.finish().await?;
        if termination.exit_code != exit_code::SUCCESS {
            return Err(WorkerError::from_exit_code(termination.exit_code));
        }
        Ok(termination.return_value)
    }

    fn run_stream(
        &self,
        request: WorkerRequest,
        cancel: Option<CancellationToken>,
    ) -> impl Stream<Item = Result<OutputLine, WorkerError>> + Send + use<> {
        let command = self.command.clone();
        let authenticator = self.authenticator.clone();
        stream! {
            let cancel = cancel.unwrap_or_default();
            let mut session = match WorkerSession::spawn(&command, &request, authenticator, cancel)
            {
                Ok(session) => session,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            loop {
                match session.next_output().await {
                    Ok(Some(line)) => yield Ok(line),
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }

            match session.finish().await {
                Ok(termination) if termination.exit_code == exit_code::SUCCESS => {}
                Ok(termination) => yield Err(WorkerError::from_exit_code(termination.exit_code)),
                Err(err) => yield Err(err),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
