//! Port for the download engine that runs inside the worker process.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::exit_code;
use crate::ports::Authenticator;
use crate::request::{
    AppDownloadRequest, BuildIdRequest, DownloadSettings, PublishedFileRequest, UgcDownloadRequest,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors a [`DownloadEngine`] reports.
///
/// Each variant maps to one worker exit code, which is how the failure
/// reaches the supervisor on the other side of the process boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("login failed: {message}")]
    Login { message: String },

    #[error("{message}")]
    Download { message: String },

    #[error("download was cancelled")]
    Cancelled,

    /// Anything the engine did not classify.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn login(message: impl Into<String>) -> Self {
        Self::Login {
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    /// The exit code a worker reports for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Login { .. } => exit_code::LOGIN_ERROR,
            Self::Download { .. } | Self::Cancelled => exit_code::DOWNLOAD_ERROR,
            Self::Other(_) => exit_code::UNKNOWN_ERROR,
        }
    }
}

// ============================================================================
// Port
// ============================================================================

/// The content downloader the worker process drives.
///
/// The worker calls [`connect`](DownloadEngine::connect) once, then exactly
/// one operation, then [`disconnect`](DownloadEngine::disconnect) on every
/// path out. Engines report progress by writing lines to stdout/stderr;
/// the supervisor relays them to the embedding application.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Establish the backend session.
    ///
    /// `settings` is `None` for anonymous operations such as build-id
    /// queries. Interactive challenges raised during login go through
    /// `authenticator`.
    async fn connect(
        &self,
        settings: Option<&DownloadSettings>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<(), EngineError>;

    async fn download_app(&self, request: &AppDownloadRequest) -> Result<(), EngineError>;

    async fn download_published_file(
        &self,
        request: &PublishedFileRequest,
    ) -> Result<(), EngineError>;

    async fn download_ugc(&self, request: &UgcDownloadRequest) -> Result<(), EngineError>;

    /// Current build id of an app branch.
    async fn build_id(&self, request: &BuildIdRequest) -> Result<u32, EngineError>;

    /// Tear the session down. Must be safe to call after a failed connect.
    async fn disconnect(&self);
}

// ============================================================================
// Tests
// ============================================================================
