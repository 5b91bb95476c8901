//! Worker-process entry point.
//!
//! An embedding binary becomes its own worker: [`run_if_worker`] checks the
//! argv sentinel first thing in `main` and, when present, runs the request
//! against the supplied [`DownloadEngine`] instead of the host application.
//! Inside the worker, stdout belongs to the control channel and ordinary
//! progress text; diagnostics go to stderr so they can never desync the
//! framing. The worker always ends in a process exit code — engine failures
//! are mapped, never rethrown.

use std::sync::Arc;

use depotdl_core::ports::{Authenticator, DownloadEngine, EngineError};
use depotdl_core::protocol::ControlMessage;
use depotdl_core::request::WorkerRequest;
use depotdl_core::{exit_code, marshal};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::error;

use crate::command::WORKER_SENTINEL;
use crate::watchdog;

/// Whether the current process was spawned as a worker.
pub fn is_worker_invocation() -> bool {
    std::env::args().nth(1).as_deref() == Some(WORKER_SENTINEL)
}

/// Run as a worker if this process was spawned as one.
///
/// Call this at the top of `main`, before any host logic:
///
/// ```no_run
/// # async fn host() -> anyhow::Result<()> { Ok(()) }
/// # struct Engine;
/// # #[async_trait::async_trait]
/// # impl depotdl_core::DownloadEngine for Engine {
/// #     async fn connect(
/// #         &self,
/// #         _: Option<&depotdl_core::DownloadSettings>,
/// #         _: std::sync::Arc<dyn depotdl_core::Authenticator>,
/// #     ) -> Result<(), depotdl_core::EngineError> { Ok(()) }
/// #     async fn download_app(&self, _: &depotdl_core::AppDownloadRequest) -> Result<(), depotdl_core::EngineError> { Ok(()) }
/// #     async fn download_published_file(&self, _: &depotdl_core::PublishedFileRequest) -> Result<(), depotdl_core::EngineError> { Ok(()) }
/// #     async fn download_ugc(&self, _: &depotdl_core::UgcDownloadRequest) -> Result<(), depotdl_core::EngineError> { Ok(()) }
/// #     async fn build_id(&self, _: &depotdl_core::BuildIdRequest) -> Result<u32, depotdl_core::EngineError> { Ok(0) }
/// #     async fn disconnect(&self) {}
/// # }
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     if let Some(code) = depotdl_runtime::run_if_worker(std::sync::Arc::new(Engine)).await {
///         std::process::exit(code);
///     }
///     host().await
/// }
/// ```
///
/// Returns `None` when the process is the host, `Some(exit_code)` when it
/// ran as a worker and should exit with that code.
pub async fn run_if_worker(engine: Arc<dyn DownloadEngine>) -> Option<i32> {
    if !is_worker_invocation() {
        return None;
    }
    init_worker_diagnostics();

    let args: Vec<String> = std::env::args().skip(2).collect();
    Some(run_worker(engine, &args).await)
}

/// Run one worker request to completion, returning the exit code.
///
/// `args` is the argv tail after the sentinel: the marshalled request and
/// the parent process id. Dedicated worker binaries (spawned via
/// [`crate::WorkerCommand::new`]) can call this directly with their own
/// argv. Never panics out: every failure maps to an exit code.
pub async fn run_worker(engine: Arc<dyn DownloadEngine>, args: &[String]) -> i32 {
    let [wire, parent] = args else {
        error!("worker expects exactly [request, parent-pid], got {} args", args.len());
        return exit_code::UNKNOWN_ERROR;
    };
    let Ok(parent_pid) = parent.parse::<i32>() else {
        error!("worker parent pid is not a number: {parent}");
        return exit_code::UNKNOWN_ERROR;
    };
    let request: WorkerRequest = match marshal::from_wire(wire) {
        Ok(request) => request,
        Err(err) => {
            error!("worker request failed to decode: {err}");
            return exit_code::UNKNOWN_ERROR;
        }
    };

    watchdog::spawn_parent_watchdog(parent_pid);

    // Outermost containment: even a panic in teardown still comes back as
    // an exit code instead of a crash.
    match tokio::spawn(execute(engine, request)).await {
        Ok(code) => code,
        Err(err) => {
            error!("worker task failed: {err}");
            exit_code::UNKNOWN_ERROR
        }
    }
}

async fn execute(engine: Arc<dyn DownloadEngine>, mut request: WorkerRequest) -> i32 {
    if let Some(settings) = request.settings_mut() {
        settings.max_downloads = settings.effective_max_downloads();
    }

    let authenticator: Arc<dyn Authenticator> = Arc::new(WorkerAuthenticator::new());

    // The connect/operation phase runs in its own task so that a panicking
    // engine still reaches disconnect below.
    let operation = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            match engine.connect(request.settings(), authenticator).await {
                Ok(()) => run_operation(engine.as_ref(), &request).await,
                Err(err) => {
                    eprintln!("{err}");
                    err.exit_code()
                }
            }
        })
    };
    let code = match operation.await {
        Ok(code) => code,
        Err(err) => {
            error!("worker operation failed: {err}");
            exit_code::UNKNOWN_ERROR
        }
    };
    engine.disconnect().await;
    code
}

async fn run_operation(engine: &dyn DownloadEngine, request: &WorkerRequest) -> i32 {
    match request {
        WorkerRequest::DownloadApp(request) => {
            download_outcome(engine.download_app(request).await)
        }
        WorkerRequest::DownloadPublishedFile(request) => {
            download_outcome(engine.download_published_file(request).await)
        }
        WorkerRequest::DownloadUgc(request) => {
            download_outcome(engine.download_ugc(request).await)
        }
        WorkerRequest::AppBuildId(request) => match engine.build_id(request).await {
            Ok(build_id) => match emit_return_value(&build_id).await {
                Ok(()) => exit_code::SUCCESS,
                Err(err) => {
                    eprintln!("{err}");
                    exit_code::UNKNOWN_ERROR
                }
            },
            Err(err @ EngineError::Login { .. }) => {
                eprintln!("{err}");
                exit_code::LOGIN_ERROR
            }
            // The query has no partial-success modes; everything else is
            // unknown, matching the download variants' unhandled path.
            Err(err) => {
                eprintln!("{err}");
                exit_code::UNKNOWN_ERROR
            }
        },
    }
}

/// Map a finished download to its exit code, printing what a foreground run
/// would have shown.
fn download_outcome(result: Result<(), EngineError>) -> i32 {
    match result {
        Ok(()) => exit_code::SUCCESS,
        Err(err @ (EngineError::Download { .. } | EngineError::Cancelled)) => {
            println!("{err}");
            exit_code::DOWNLOAD_ERROR
        }
        Err(err @ EngineError::Login { .. }) => {
            eprintln!("{err}");
            exit_code::LOGIN_ERROR
        }
        Err(EngineError::Other(err)) => {
            eprintln!("Download failed due to an unhandled exception: {err}");
            exit_code::UNKNOWN_ERROR
        }
    }
}

/// Deliver the request's return value over the control channel.
async fn emit_return_value<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let payload = marshal::to_wire(value)?;
    let line = ControlMessage::ReturnValue { payload }.encode()?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Worker diagnostics go to stderr; stdout is the control channel.
fn init_worker_diagnostics() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// Worker-side authenticator
// ============================================================================

/// The engine-facing [`Authenticator`] inside the worker.
///
/// Each challenge becomes one control line on stdout, flushed immediately
/// (piped stdout is block-buffered; an unflushed challenge would deadlock
/// the exchange), followed by a blocking read of exactly one answer line
/// from stdin. The engine awaits each challenge before raising the next, so
/// the mutexes never contend.
struct WorkerAuthenticator {
    stdout: Mutex<Stdout>,
    stdin: Mutex<Lines<BufReader<Stdin>>>,
}

impl WorkerAuthenticator {
    fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
            stdin: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn exchange(&self, challenge: &ControlMessage) -> anyhow::Result<String> {
        let line = challenge.encode()?;
        {
            let mut stdout = self.stdout.lock().await;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        let answer = self.stdin.lock().await.next_line().await?;
        answer.ok_or_else(|| anyhow::anyhow!("supervisor closed stdin without answering"))
    }
}

#[async_trait::async_trait]
impl Authenticator for WorkerAuthenticator {
    async fn device_code(&self, previous_incorrect: bool) -> anyhow::Result<String> {
        self.exchange(&ControlMessage::DeviceCode { previous_incorrect })
            .await
    }

    async fn email_code(&self, email: &str, previous_incorrect: bool) -> anyhow::Result<String> {
        self.exchange(&ControlMessage::EmailCode {
            email: email.to_string(),
            previous_incorrect,
        })
        .await
    }

    async fn confirm_device(&self) -> anyhow::Result<bool> {
        match self.exchange(&ControlMessage::DeviceConfirmation).await?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => anyhow::bail!("confirmation answer is not a boolean: {other}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
