use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while pulling data from the upstream repository.
///
/// Only [`PipelineError::RemoteListing`] aborts a run. Every other variant is
/// scoped to a single app and downgrades to a skip or a fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("failed to list apps from {url}: {detail}")]
    RemoteListing { url: String, detail: String },
    #[error("failed to fetch manifest for `{app_id}` from {url}: {detail}")]
    ManifestFetch {
        app_id: String,
        url: String,
        detail: String,
    },
    #[error("manifest for `{app_id}` is not readable text: {detail}")]
    ManifestParse { app_id: String, detail: String },
    #[error("icon for `{app_id}` is unavailable at {url}: {detail}")]
    AssetUnavailable {
        app_id: String,
        url: String,
        detail: String,
    },
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RemoteListing { .. })
    }
}

/// Non-fatal problems met while patching the static HTML document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SiteWarning {
    #[error("site document {} does not exist; skipped HTML injection", .path.display())]
    DocumentMissing { path: PathBuf },
    #[error(
        "site document {} could not be read ({detail}); skipped HTML injection",
        .path.display()
    )]
    DocumentUnreadable { path: PathBuf, detail: String },
    #[error("site document {} could not be written: {detail}", .path.display())]
    DocumentUnwritable { path: PathBuf, detail: String },
    #[error("no embedded data script or APPS_DATA marker found; data embedding skipped")]
    DataAnchorMissing,
    #[error("no element with class `{class}` found; featured apps not rendered")]
    FeaturedContainerMissing { class: String },
    #[error("element with class `{class}` has no matching close tag; featured apps not rendered")]
    FeaturedContainerUnterminated { class: String },
}
