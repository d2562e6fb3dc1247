use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::download::{ApplyResult, ArtifactDownloader, DownloadError, Installer};
use crate::feed::{FeedError, FeedErrorKind, ReleaseRecord, ReleaseSource, newest_release};
use crate::version::is_newer_version;

const EVENT_CAPACITY: usize = 64;
const PROGRESS_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Feed(FeedErrorKind),
    Download,
    Checksum,
    Install,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl UpdateFailure {
    fn from_feed(error: &FeedError) -> Self {
        Self {
            kind: FailureKind::Feed(error.kind()),
            message: error.to_string(),
        }
    }

    fn from_download(error: &DownloadError) -> Self {
        let kind = match error {
            DownloadError::ChecksumMismatch { .. } => FailureKind::Checksum,
            _ => FailureKind::Download,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }

    fn from_install(error: &DownloadError) -> Self {
        Self {
            kind: FailureKind::Install,
            message: format!("failed to launch installer: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedUpdate {
    pub release: ReleaseRecord,
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    Available(ReleaseRecord),
    Downloading { release: ReleaseRecord, percent: u8 },
    Downloaded(DownloadedUpdate),
    Failed(UpdateFailure),
}

impl UpdateState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Available(_) => "available",
            Self::Downloading { .. } => "downloading",
            Self::Downloaded(_) => "downloaded",
            Self::Failed(_) => "failed",
        }
    }

    fn audit_detail(&self) -> String {
        match self {
            Self::Idle | Self::Checking => String::new(),
            Self::Available(release) => format!(" ({})", release.tag),
            Self::Downloading { release, percent } => format!(" ({} {percent}%)", release.tag),
            Self::Downloaded(update) => format!(" ({})", update.artifact_path.display()),
            Self::Failed(failure) => format!(" ({})", failure.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub previous: UpdateState,
    pub current: UpdateState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("cannot {action} while update state is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("{}", .0.message)]
    Install(UpdateFailure),
}

impl UpdateError {
    fn invalid(action: &'static str, state: &UpdateState) -> Self {
        Self::InvalidTransition {
            action,
            state: state.name(),
        }
    }
}

struct Shared {
    state: UpdateState,
    generation: u64,
}

/// Owns the update lifecycle: check, download, install.
///
/// Results of a check or download are applied only while the operation's
/// generation is still current, so a newer check supersedes anything in
/// flight.
pub struct UpdateController {
    current_version: String,
    include_prereleases: bool,
    source: Arc<dyn ReleaseSource>,
    downloader: Arc<dyn ArtifactDownloader>,
    installer: Arc<dyn Installer>,
    shared: Mutex<Shared>,
    events: broadcast::Sender<StateTransition>,
}

impl UpdateController {
    pub fn new(
        current_version: impl Into<String>,
        source: Arc<dyn ReleaseSource>,
        downloader: Arc<dyn ArtifactDownloader>,
        installer: Arc<dyn Installer>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current_version: current_version.into(),
            include_prereleases: false,
            source,
            downloader,
            installer,
            shared: Mutex::new(Shared {
                state: UpdateState::Idle,
                generation: 0,
            }),
            events,
        }
    }

    #[must_use]
    pub fn with_prereleases(mut self, include_prereleases: bool) -> Self {
        self.include_prereleases = include_prereleases;
        self
    }

    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    #[must_use]
    pub fn state(&self) -> UpdateState {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.events.subscribe()
    }

    /// Query the release source and move to `Available`, `Idle` or `Failed`.
    ///
    /// Allowed from any state. Returns the state after the check, which is
    /// the newer operation's state when this check was superseded.
    pub async fn check_for_updates(&self) -> UpdateState {
        let generation = {
            let mut shared = self.lock();
            shared.generation += 1;
            self.transition(&mut shared, UpdateState::Checking);
            shared.generation
        };

        let next = match self.source.fetch_releases().await {
            Ok(releases) => match newest_release(&releases, self.include_prereleases) {
                Some(newest) if is_newer_version(&newest.tag, &self.current_version) => {
                    UpdateState::Available(newest.clone())
                }
                Some(newest) => {
                    debug!(
                        "Newest release {} is not newer than {}",
                        newest.tag, self.current_version
                    );
                    UpdateState::Idle
                }
                None => UpdateState::Idle,
            },
            Err(error) => {
                warn!("Update check failed: {error}");
                UpdateState::Failed(UpdateFailure::from_feed(&error))
            }
        };

        self.apply(generation, next)
    }

    /// Drop an offered update and return to `Idle`.
    ///
    /// # Errors
    /// Returns [`UpdateError::InvalidTransition`] unless an update is available.
    pub fn decline(&self) -> Result<(), UpdateError> {
        let mut shared = self.lock();
        if !matches!(shared.state, UpdateState::Available(_)) {
            return Err(UpdateError::invalid("decline", &shared.state));
        }
        self.set_state(&mut shared, UpdateState::Idle);
        Ok(())
    }

    /// Download the available release, reporting progress as state changes.
    ///
    /// # Errors
    /// Returns [`UpdateError::InvalidTransition`] unless an update is available.
    /// Download failures are not errors here: they land in `Failed`.
    pub async fn download(&self) -> Result<UpdateState, UpdateError> {
        let (release, generation) = {
            let mut shared = self.lock();
            let UpdateState::Available(release) = &shared.state else {
                return Err(UpdateError::invalid("download", &shared.state));
            };
            let release = release.clone();
            shared.generation += 1;
            self.set_state(
                &mut shared,
                UpdateState::Downloading {
                    release: release.clone(),
                    percent: 0,
                },
            );
            (release, shared.generation)
        };

        let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_CAPACITY);
        let download = self.downloader.download(&release, progress_tx);
        let drain = async {
            while let Some(progress) = progress_rx.recv().await {
                if let Some(percent) = progress.percent() {
                    self.report_progress(generation, percent);
                }
            }
        };
        let (result, ()) = tokio::join!(download, drain);

        let next = match result {
            Ok(artifact_path) => UpdateState::Downloaded(DownloadedUpdate {
                release,
                artifact_path,
            }),
            Err(error) => {
                warn!("Update download failed: {error}");
                UpdateState::Failed(UpdateFailure::from_download(&error))
            }
        };

        Ok(self.apply(generation, next))
    }

    /// Hand the downloaded artifact to the installer.
    ///
    /// On success the caller is expected to exit or restart the process.
    ///
    /// # Errors
    /// Returns [`UpdateError::InvalidTransition`] unless an update is
    /// downloaded, and [`UpdateError::Install`] when the installer fails to
    /// launch (the state becomes `Failed` as well).
    pub fn install(&self) -> Result<ApplyResult, UpdateError> {
        let artifact_path = {
            let shared = self.lock();
            let UpdateState::Downloaded(update) = &shared.state else {
                return Err(UpdateError::invalid("install", &shared.state));
            };
            update.artifact_path.clone()
        };

        match self.installer.install(&artifact_path) {
            Ok(result) => {
                info!("Update installer launched: {result:?}");
                Ok(result)
            }
            Err(error) => {
                let failure = UpdateFailure::from_install(&error);
                let mut shared = self.lock();
                self.set_state(&mut shared, UpdateState::Failed(failure.clone()));
                Err(UpdateError::Install(failure))
            }
        }
    }

    /// Keep the downloaded update for later. No transition happens.
    ///
    /// # Errors
    /// Returns [`UpdateError::InvalidTransition`] unless an update is downloaded.
    pub fn defer_install(&self) -> Result<(), UpdateError> {
        let shared = self.lock();
        if let UpdateState::Downloaded(update) = &shared.state {
            info!("Install of {} deferred", update.release.tag);
            Ok(())
        } else {
            Err(UpdateError::invalid("defer install", &shared.state))
        }
    }

    fn report_progress(&self, generation: u64, percent: u8) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }
        let UpdateState::Downloading {
            release,
            percent: current,
        } = &shared.state
        else {
            return;
        };
        let percent = percent.min(100);
        if percent <= *current {
            return;
        }
        let next = UpdateState::Downloading {
            release: release.clone(),
            percent,
        };
        self.set_state(&mut shared, next);
    }

    fn apply(&self, generation: u64, next: UpdateState) -> UpdateState {
        let mut shared = self.lock();
        if shared.generation != generation {
            debug!(
                "Discarding stale update result ({}) from generation {generation}, current is {}",
                next.name(),
                shared.generation
            );
            return shared.state.clone();
        }
        self.set_state(&mut shared, next);
        shared.state.clone()
    }

    fn set_state(&self, shared: &mut Shared, next: UpdateState) {
        if shared.state != next {
            self.transition(shared, next);
        }
    }

    /// Always emits, so a check that supersedes one in flight shows up as
    /// `checking -> checking`.
    fn transition(&self, shared: &mut Shared, next: UpdateState) {
        let previous = std::mem::replace(&mut shared.state, next);
        info!(
            "Update state: {}{} -> {}{}",
            previous.name(),
            previous.audit_detail(),
            shared.state.name(),
            shared.state.audit_detail()
        );
        let _ = self.events.send(StateTransition {
            previous,
            current: shared.state.clone(),
            timestamp: Utc::now(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
