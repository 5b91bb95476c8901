//! Request types that cross the worker process boundary.
//!
//! Every download variant shares [`DownloadSettings`]; the variant structs
//! add their own identifiers on top. [`WorkerRequest`] is the envelope that
//! is marshalled into the worker's argv, so all types here must round-trip
//! exactly through [`crate::marshal`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Branch used when a request does not name one.
pub const DEFAULT_BRANCH: &str = "public";

/// Concurrency limit applied when [`DownloadSettings::max_downloads`] is `0`.
pub const DEFAULT_MAX_DOWNLOADS: usize = 8;

// ============================================================================
// Shared settings
// ============================================================================

/// Settings common to every download variant.
///
/// A `max_downloads` of `0` means "use the default"; the worker resolves it
/// via [`DownloadSettings::effective_max_downloads`] before the engine sees
/// the request.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Content-server cell to prefer, `0` for automatic selection.
    pub cell_id: u32,
    pub download_all_platforms: bool,
    pub download_all_archs: bool,
    pub download_all_languages: bool,
    /// Fetch manifests only, skipping file content.
    pub manifest_only: bool,
    pub install_directory: Option<PathBuf>,
    /// Exact file paths to download instead of the full depot.
    pub files_to_download: Vec<String>,
    /// Regex sources matched against depot paths; compiled by the engine.
    pub file_regexes: Vec<String>,
    pub beta_password: Option<String>,
    pub verify_all: bool,
    pub max_downloads: usize,
    /// Relative file name for the engine's login-data store.
    /// `None` disables persistence.
    pub account_settings_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub remember_password: bool,
    /// Login-session id, allowing several sessions for one account.
    pub login_id: Option<u32>,
    pub use_qr_code: bool,
}

impl DownloadSettings {
    /// Whether the request restricts itself to named files or patterns.
    pub fn has_file_list(&self) -> bool {
        !self.files_to_download.is_empty() || !self.file_regexes.is_empty()
    }

    /// The concurrency limit with the `0` placeholder resolved.
    pub const fn effective_max_downloads(&self) -> usize {
        if self.max_downloads == 0 {
            DEFAULT_MAX_DOWNLOADS
        } else {
            self.max_downloads
        }
    }
}

// ============================================================================
// Request variants
// ============================================================================

/// Download an app's depots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDownloadRequest {
    #[serde(flatten)]
    pub settings: DownloadSettings,
    pub app_id: u32,
    /// Specific `(depot, manifest)` pairs; empty means all matching depots
    /// at their current manifests.
    #[serde(default)]
    pub depot_manifest_ids: Vec<(u32, u64)>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub low_violence: bool,
}

impl AppDownloadRequest {
    pub fn new(app_id: u32) -> Self {
        Self {
            settings: DownloadSettings::default(),
            app_id,
            depot_manifest_ids: Vec::new(),
            branch: DEFAULT_BRANCH.to_string(),
            os: None,
            arch: None,
            language: None,
            low_violence: false,
        }
    }
}

/// Download a published workshop file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedFileRequest {
    #[serde(flatten)]
    pub settings: DownloadSettings,
    pub app_id: u32,
    pub published_file_id: u64,
}

impl PublishedFileRequest {
    pub fn new(app_id: u32, published_file_id: u64) -> Self {
        Self {
            settings: DownloadSettings::default(),
            app_id,
            published_file_id,
        }
    }
}

/// Download a piece of user-generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UgcDownloadRequest {
    #[serde(flatten)]
    pub settings: DownloadSettings,
    pub app_id: u32,
    pub ugc_id: u64,
}

impl UgcDownloadRequest {
    pub fn new(app_id: u32, ugc_id: u64) -> Self {
        Self {
            settings: DownloadSettings::default(),
            app_id,
            ugc_id,
        }
    }
}

/// Look up the current build id of an app branch.
///
/// Carries no [`DownloadSettings`]: the query runs anonymously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdRequest {
    pub app_id: u32,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl BuildIdRequest {
    pub fn new(app_id: u32) -> Self {
        Self {
            app_id,
            branch: DEFAULT_BRANCH.to_string(),
        }
    }

    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

// ============================================================================
// Envelope
// ============================================================================

/// The request envelope handed to a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerRequest {
    DownloadApp(AppDownloadRequest),
    DownloadPublishedFile(PublishedFileRequest),
    DownloadUgc(UgcDownloadRequest),
    AppBuildId(BuildIdRequest),
}

impl WorkerRequest {
    /// Settings shared by the download variants; `None` for anonymous ops.
    pub const fn settings(&self) -> Option<&DownloadSettings> {
        match self {
            Self::DownloadApp(request) => Some(&request.settings),
            Self::DownloadPublishedFile(request) => Some(&request.settings),
            Self::DownloadUgc(request) => Some(&request.settings),
            Self::AppBuildId(_) => None,
        }
    }

    pub fn settings_mut(&mut self) -> Option<&mut DownloadSettings> {
        match self {
            Self::DownloadApp(request) => Some(&mut request.settings),
            Self::DownloadPublishedFile(request) => Some(&mut request.settings),
            Self::DownloadUgc(request) => Some(&mut request.settings),
            Self::AppBuildId(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
