use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError, user_agent};
use crate::version::compare_versions;

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub tag: String,
    pub name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub prerelease: bool,
    pub notes: String,
    pub html_url: String,
    /// Platform installer when the release ships one, release page otherwise.
    pub download_url: String,
    pub asset: Option<ReleaseAsset>,
}

impl ReleaseRecord {
    /// Tag without its leading `v`.
    #[must_use]
    pub fn version(&self) -> &str {
        self.tag.strip_prefix(['v', 'V']).unwrap_or(&self.tag)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

impl From<GitHubRelease> for ReleaseRecord {
    fn from(release: GitHubRelease) -> Self {
        let asset = release
            .assets
            .iter()
            .find(|asset| is_platform_installer(&asset.name))
            .map(|asset| ReleaseAsset {
                name: asset.name.clone(),
                url: asset.browser_download_url.clone(),
                size: asset.size,
                sha256: asset.digest.as_deref().and_then(parse_sha256_digest),
            });
        let download_url = asset
            .as_ref()
            .map_or_else(|| release.html_url.clone(), |asset| asset.url.clone());

        Self {
            name: release
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| release.tag_name.clone()),
            tag: release.tag_name,
            published_at: release.published_at,
            prerelease: release.prerelease,
            notes: release.body.unwrap_or_default(),
            html_url: release.html_url,
            download_url,
            asset,
        }
    }
}

fn installer_extensions() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &[".exe", ".msi"]
    } else if cfg!(target_os = "macos") {
        &[".dmg"]
    } else if cfg!(target_os = "linux") {
        &[".appimage"]
    } else {
        &[]
    }
}

fn is_platform_installer(asset_name: &str) -> bool {
    let lower = asset_name.to_ascii_lowercase();
    installer_extensions()
        .iter()
        .any(|extension| lower.ends_with(extension))
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}

/// `owner/name` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySlug {
    pub owner: String,
    pub name: String,
}

impl RepositorySlug {
    /// Accepts `owner/repo`, `https://github.com/owner/repo(.git)` and
    /// `git@github.com:owner/repo.git`.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let path = if let Some(idx) = trimmed.find("github.com") {
            trimmed[idx + "github.com".len()..].trim_start_matches([':', '/'])
        } else if trimmed.contains("://") || trimmed.contains('@') {
            return None;
        } else {
            trimmed
        };

        let mut parts = path.split('/');
        let owner = parts.next()?;
        let name = parts.next()?;
        if parts.next().is_some() || !is_valid_segment(owner) || !is_valid_segment(name) {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

impl fmt::Display for RepositorySlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// How an HTTP 403 from the feed is classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForbiddenPolicy {
    /// Exhausted `x-ratelimit-remaining` means rate limited, anything else forbidden.
    #[default]
    QuotaHeaders,
    AlwaysForbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    Unauthorized,
    Forbidden,
    RateLimited,
    NotFound,
    Network,
    MalformedResponse,
}

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("release feed unreachable: {0}")]
    Transport(#[source] TransportError),
    #[error("release feed requires authentication (HTTP 401), configure a GitHub token")]
    Unauthorized,
    #[error("access to release feed denied (HTTP 403){body_snippet}")]
    Forbidden { body_snippet: String },
    #[error("GitHub API rate limit exceeded{}", reset_suffix(.reset_at.as_ref()))]
    RateLimited { reset_at: Option<DateTime<Utc>> },
    #[error("repository not found: {repository}")]
    NotFound { repository: String },
    #[error("release feed request failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse release feed response: {details}")]
    MalformedResponse { details: String },
}

fn reset_suffix(reset_at: Option<&DateTime<Utc>>) -> String {
    reset_at
        .map(|at| format!(", resets at {}", at.to_rfc3339()))
        .unwrap_or_default()
}

impl FeedError {
    #[must_use]
    pub fn kind(&self) -> FeedErrorKind {
        match self {
            Self::Unauthorized => FeedErrorKind::Unauthorized,
            Self::Forbidden { .. } => FeedErrorKind::Forbidden,
            Self::RateLimited { .. } => FeedErrorKind::RateLimited,
            Self::NotFound { .. } => FeedErrorKind::NotFound,
            Self::Transport(_) | Self::HttpStatus { .. } => FeedErrorKind::Network,
            Self::MalformedResponse { .. } => FeedErrorKind::MalformedResponse,
        }
    }
}

/// Anything that can list published releases.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_releases(&self) -> Result<Vec<ReleaseRecord>, FeedError>;
}

pub struct ReleaseFeed {
    transport: Arc<dyn HttpTransport>,
    repository: RepositorySlug,
    token: Option<String>,
    forbidden_policy: ForbiddenPolicy,
}

impl ReleaseFeed {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, repository: RepositorySlug) -> Self {
        Self {
            transport,
            repository,
            token: None,
            forbidden_policy: ForbiddenPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|token| !token.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_forbidden_policy(mut self, policy: ForbiddenPolicy) -> Self {
        self.forbidden_policy = policy;
        self
    }

    #[must_use]
    pub fn repository(&self) -> &RepositorySlug {
        &self.repository
    }

    #[must_use]
    pub fn releases_url(&self) -> String {
        format!(
            "{GITHUB_API_BASE}/repos/{}/{}/releases",
            self.repository.owner, self.repository.name
        )
    }

    fn classify_failure(&self, response: &HttpResponse) -> FeedError {
        match response.status {
            StatusCode::UNAUTHORIZED => FeedError::Unauthorized,
            StatusCode::FORBIDDEN => {
                let quota_exhausted = response
                    .header("x-ratelimit-remaining")
                    .is_some_and(|remaining| remaining.trim() == "0");
                if self.forbidden_policy == ForbiddenPolicy::QuotaHeaders && quota_exhausted {
                    FeedError::RateLimited {
                        reset_at: rate_limit_reset(response),
                    }
                } else {
                    FeedError::Forbidden {
                        body_snippet: response.snippet(160),
                    }
                }
            }
            StatusCode::TOO_MANY_REQUESTS => FeedError::RateLimited {
                reset_at: rate_limit_reset(response),
            },
            StatusCode::NOT_FOUND => FeedError::NotFound {
                repository: self.repository.to_string(),
            },
            status => FeedError::HttpStatus {
                status,
                body_snippet: response.snippet(160),
            },
        }
    }
}

fn rate_limit_reset(response: &HttpResponse) -> Option<DateTime<Utc>> {
    let epoch = response.header("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    DateTime::<Utc>::from_timestamp(epoch, 0)
}

#[async_trait]
impl ReleaseSource for ReleaseFeed {
    async fn fetch_releases(&self) -> Result<Vec<ReleaseRecord>, FeedError> {
        let url = self.releases_url();
        debug!("Fetching releases from {url}");

        let mut request = HttpRequest::get(url)
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", user_agent());
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        } else {
            debug!("No GitHub token configured, repository must be public");
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(FeedError::Transport)?;

        if !response.is_success() {
            return Err(self.classify_failure(&response));
        }

        let releases: Vec<GitHubRelease> =
            serde_json::from_slice(&response.body).map_err(|error| {
                FeedError::MalformedResponse {
                    details: error.to_string(),
                }
            })?;

        let records: Vec<ReleaseRecord> = releases
            .into_iter()
            .filter(|release| !release.draft)
            .map(ReleaseRecord::from)
            .collect();
        info!("Fetched {} releases for {}", records.len(), self.repository);
        Ok(records)
    }
}

/// Newest release by version order, skipping pre-releases unless allowed.
#[must_use]
pub fn newest_release(
    releases: &[ReleaseRecord],
    include_prereleases: bool,
) -> Option<&ReleaseRecord> {
    releases
        .iter()
        .filter(|release| include_prereleases || !release.prerelease)
        .max_by(|a, b| compare_versions(&a.tag, &b.tag))
}
