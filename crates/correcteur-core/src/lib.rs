//! Core logic for Correcteur, independent of the command-line shell.
//!
//! - Version comparison for release tags.
//! - GitHub release feed fetching and classification of its failures.
//! - The update lifecycle state machine plus artifact download and install.
//! - The text correction client and API key validation.
//!
//! All network access goes through [`HttpTransport`], so the rest of the
//! crate can be exercised against scripted responses.

mod correction;
mod credential;
pub mod download;
mod feed;
mod http;
mod update;
mod version;

/// Correction request/response model and the completion API client.
pub use correction::{
    ApiKey, CorrectionClient, CorrectionError, CorrectionRequest, CorrectionResult,
    DEFAULT_API_BASE_URL, DEFAULT_MODEL, ErrorClass, FALLBACK_SUMMARY, Mistake, MistakeKind,
};
/// API key pre-flight check against the model-list endpoint.
pub use credential::{InvalidKeyReason, KeyValidation, MIN_API_KEY_LEN};
/// Artifact download, installation and restart helpers.
pub use download::{
    ApplyResult, ArtifactDownloader, DownloadError, DownloadProgress, HttpArtifactDownloader,
    Installer, PlatformInstaller,
};
/// Release feed model and fetcher.
pub use feed::{
    FeedError, FeedErrorKind, ForbiddenPolicy, ReleaseAsset, ReleaseFeed, ReleaseRecord,
    ReleaseSource, RepositorySlug, newest_release,
};
/// HTTP seam shared by the feed and correction clients.
pub use http::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError, user_agent,
};
/// Update lifecycle controller and its observable state.
pub use update::{
    DownloadedUpdate, FailureKind, StateTransition, UpdateController, UpdateError, UpdateFailure,
    UpdateState,
};
/// Release tag ordering.
pub use version::{Version, VersionParseError, compare, compare_versions, is_newer_version};
