//! Full round trip over a real process boundary.
//!
//! Runs without the libtest harness so the test binary can double as the
//! worker: `main` hands control to `run_if_worker` first, exactly like an
//! embedding application, and every scenario below therefore exercises the
//! real spawn → control channel → exit path with a scripted engine on the
//! worker side. A failed assertion aborts the binary, which is the failure
//! signal cargo sees.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use depotdl_core::ports::{Authenticator, DownloadEngine, EngineError};
use depotdl_core::request::{AppDownloadRequest, BuildIdRequest, DownloadSettings};
use depotdl_core::WorkerError;
use depotdl_runtime::{RunOptions, WorkerRunner, run_if_worker};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

// App ids the scripted engine reacts to.
const APP_OK: u32 = 440;
const APP_UNSUBSCRIBED: u32 = 666;
const APP_HANGS: u32 = 999;
const APP_WITH_BUILD_ID: u32 = 307_290;
const KNOWN_BUILD_ID: u32 = 587_726;
const DEVICE_CODE: &str = "STEAM-GUARD-123";

#[tokio::main]
async fn main() {
    if let Some(code) = run_if_worker(Arc::new(ScriptedEngine)).await {
        std::process::exit(code);
    }

    build_id_round_trip().await;
    login_failure_surfaces_without_a_result().await;
    interactive_authentication_round_trip().await;
    download_failure_carries_the_engine_message().await;
    settings_cross_the_boundary_intact().await;
    cancellation_kills_a_hanging_worker().await;
    stream_shape_reports_success_by_ending_cleanly().await;

    println!("worker_roundtrip: all scenarios passed");
}

// ============================================================================
// Worker side: the scripted engine
// ============================================================================

struct ScriptedEngine;

#[async_trait]
impl DownloadEngine for ScriptedEngine {
    async fn connect(
        &self,
        settings: Option<&DownloadSettings>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<(), EngineError> {
        let Some(settings) = settings else {
            // Anonymous session for build-id queries.
            return Ok(());
        };
        match settings.username.as_deref() {
            Some("locked-out") => Err(EngineError::login("account is locked out")),
            Some("interactive") => {
                let code = authenticator
                    .device_code(false)
                    .await
                    .map_err(EngineError::Other)?;
                if code == DEVICE_CODE {
                    println!("logged in with device code");
                    Ok(())
                } else {
                    Err(EngineError::login(format!("rejected device code {code}")))
                }
            }
            _ => Ok(()),
        }
    }

    async fn download_app(&self, request: &AppDownloadRequest) -> Result<(), EngineError> {
        match request.app_id {
            APP_UNSUBSCRIBED => Err(EngineError::download(format!(
                "No subscription for app {APP_UNSUBSCRIBED}"
            ))),
            APP_HANGS => {
                println!("download started");
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
            _ => {
                if let Some(directory) = &request.settings.install_directory {
                    println!("installing into {}", directory.display());
                }
                println!("depot {} complete", request.app_id);
                Ok(())
            }
        }
    }

    async fn download_published_file(
        &self,
        request: &depotdl_core::PublishedFileRequest,
    ) -> Result<(), EngineError> {
        println!("published file {} complete", request.published_file_id);
        Ok(())
    }

    async fn download_ugc(
        &self,
        request: &depotdl_core::UgcDownloadRequest,
    ) -> Result<(), EngineError> {
        println!("ugc {} complete", request.ugc_id);
        Ok(())
    }

    async fn build_id(&self, request: &BuildIdRequest) -> Result<u32, EngineError> {
        if request.app_id == APP_WITH_BUILD_ID && request.branch == "public" {
            Ok(KNOWN_BUILD_ID)
        } else {
            Err(EngineError::download("no such app or branch"))
        }
    }

    async fn disconnect(&self) {}
}

// ============================================================================
// Supervisor side: test doubles and scenarios
// ============================================================================

#[derive(Default)]
struct CountingAuthenticator {
    device_calls: AtomicUsize,
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    async fn device_code(&self, previous_incorrect: bool) -> anyhow::Result<String> {
        assert!(!previous_incorrect, "first attempt cannot be a retry");
        self.device_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DEVICE_CODE.to_string())
    }

    async fn email_code(&self, _email: &str, _previous_incorrect: bool) -> anyhow::Result<String> {
        anyhow::bail!("no email challenge in these scenarios")
    }

    async fn confirm_device(&self) -> anyhow::Result<bool> {
        anyhow::bail!("no confirmation challenge in these scenarios")
    }
}

fn capture_output(lines: &Arc<Mutex<Vec<String>>>) -> RunOptions {
    RunOptions {
        on_output: Some(Box::new({
            let lines = Arc::clone(lines);
            move |line: &str| lines.lock().unwrap().push(line.to_string())
        })),
        ..RunOptions::default()
    }
}

fn runner() -> WorkerRunner {
    WorkerRunner::new().expect("current executable must be resolvable")
}

async fn build_id_round_trip() {
    let build_id = runner()
        .app_build_id(&BuildIdRequest::new(APP_WITH_BUILD_ID), RunOptions::default())
        .await
        .expect("build id query should succeed");

    assert_eq!(build_id, KNOWN_BUILD_ID);
    println!("worker_roundtrip: build_id_round_trip ok");
}

async fn login_failure_surfaces_without_a_result() {
    let mut request = AppDownloadRequest::new(APP_OK);
    request.settings.username = Some("locked-out".to_string());

    let err = runner()
        .download_app(&request, RunOptions::default())
        .await
        .expect_err("locked-out account must fail");

    assert!(matches!(err, WorkerError::Login), "got {err}");
    println!("worker_roundtrip: login_failure_surfaces_without_a_result ok");
}

async fn interactive_authentication_round_trip() {
    let authenticator = Arc::new(CountingAuthenticator::default());
    let lines = Arc::new(Mutex::new(Vec::new()));

    let mut request = AppDownloadRequest::new(APP_OK);
    request.settings.username = Some("interactive".to_string());

    runner()
        .authenticator(authenticator.clone())
        .download_app(&request, capture_output(&lines))
        .await
        .expect("interactive login should succeed");

    assert_eq!(authenticator.device_calls.load(Ordering::SeqCst), 1);
    let lines = lines.lock().unwrap();
    assert!(
        lines.iter().any(|line| line == "logged in with device code"),
        "worker-side confirmation missing from {lines:?}"
    );
    println!("worker_roundtrip: interactive_authentication_round_trip ok");
}

async fn download_failure_carries_the_engine_message() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let err = runner()
        .download_app(
            &AppDownloadRequest::new(APP_UNSUBSCRIBED),
            capture_output(&lines),
        )
        .await
        .expect_err("unsubscribed app must fail");

    assert!(matches!(err, WorkerError::Download), "got {err}");
    // The engine's message is printed by the worker and relayed verbatim.
    let lines = lines.lock().unwrap();
    assert!(
        lines
            .iter()
            .any(|line| line.contains("No subscription for app 666")),
        "engine message missing from {lines:?}"
    );
    println!("worker_roundtrip: download_failure_carries_the_engine_message ok");
}

async fn settings_cross_the_boundary_intact() {
    let directory = tempfile::tempdir().expect("tempdir");
    let lines = Arc::new(Mutex::new(Vec::new()));

    let mut request = AppDownloadRequest::new(APP_OK);
    request.settings.install_directory = Some(directory.path().to_path_buf());

    runner()
        .download_app(&request, capture_output(&lines))
        .await
        .expect("download should succeed");

    let expected = format!("installing into {}", directory.path().display());
    let lines = lines.lock().unwrap();
    assert!(
        lines.contains(&expected),
        "worker saw different settings: {lines:?}"
    );
    println!("worker_roundtrip: settings_cross_the_boundary_intact ok");
}

async fn cancellation_kills_a_hanging_worker() {
    let cancel = CancellationToken::new();
    let options = RunOptions {
        cancel: Some(cancel.clone()),
        ..RunOptions::default()
    };

    let task = tokio::spawn(async move {
        runner()
            .download_app(&AppDownloadRequest::new(APP_HANGS), options)
            .await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancellation must complete within the grace period")
        .expect("supervisor task must not panic");

    let err = result.expect_err("cancelled run cannot succeed");
    assert!(err.is_cancelled(), "got {err}");
    println!("worker_roundtrip: cancellation_kills_a_hanging_worker ok");
}

async fn stream_shape_reports_success_by_ending_cleanly() {
    let runner = runner();
    let stream = runner.download_app_stream(&AppDownloadRequest::new(APP_OK), None);
    let items: Vec<_> = Box::pin(stream).collect().await;

    // Exhausting the stream without an Err item is the success signal.
    let lines: Vec<_> = items
        .into_iter()
        .map(|item| item.expect("successful run yields no error items"))
        .collect();
    assert!(
        lines
            .iter()
            .any(|line| line.content == format!("depot {APP_OK} complete") && !line.is_error()),
        "completion line missing from {lines:?}"
    );
    println!("worker_roundtrip: stream_shape_reports_success_by_ending_cleanly ok");
}
