mod correct;
mod records;
mod update;

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use correcteur_core::{
    CorrectionClient, HttpTransport, ReleaseFeed, ReqwestTransport, RepositorySlug,
};
use correcteur_platform::AppPaths;
use correcteur_store::{JsonFileStore, UserData};
use log::{debug, info};

use crate::cli::Command;
use crate::error::AppError;
use crate::settings::{AppSettings, mask_secret};

pub struct Correcteur {
    pub(crate) settings: AppSettings,
    pub(crate) paths: AppPaths,
    pub(crate) data: UserData<JsonFileStore>,
    pub(crate) transport: Arc<dyn HttpTransport>,
}

impl Correcteur {
    /// # Errors
    /// Returns an error when the data directories, the store file or the
    /// HTTP client cannot be set up.
    pub fn new(settings: AppSettings, paths: AppPaths) -> Result<Self, AppError> {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(
            settings.http_timeout_secs,
        ))
        .map_err(AppError::environment_unavailable)?;
        Self::with_parts(settings, paths, Arc::new(transport))
    }

    pub(crate) fn with_parts(
        settings: AppSettings,
        paths: AppPaths,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, AppError> {
        paths
            .ensure_dirs()
            .map_err(AppError::environment_unavailable)?;
        let store = JsonFileStore::open(paths.store_file())
            .map_err(|error| AppError::store_failed("ouverture", error))?;

        info!(
            "Correcteur {} starting: repository={}, token={}, api={}",
            env!("CARGO_PKG_VERSION"),
            settings.repository,
            mask_secret(settings.github_token.as_deref()),
            settings.api_base_url
        );
        debug!("Settings: {settings:?}");

        Ok(Self {
            settings,
            paths,
            data: UserData::new(store),
            transport,
        })
    }

    /// # Errors
    /// Returns the failure of the command, already classified for display.
    pub async fn run(&self, command: Command) -> Result<(), AppError> {
        match command {
            Command::Update(command) => self.handle_update(command).await,
            Command::Releases => self.handle_releases().await,
            Command::Correct { category, text } => {
                self.handle_correct(category.as_deref(), text).await
            }
            Command::Key(command) => self.handle_key(command).await,
            Command::Model(command) => self.handle_model(command),
            Command::Category(command) => self.handle_category(command),
            Command::History { limit } => self.handle_history(limit),
            Command::Stats => self.handle_stats(),
            Command::Reset {
                history,
                statistics,
            } => self.handle_reset(history, statistics),
        }
    }

    pub(crate) fn correction_client(&self) -> CorrectionClient {
        CorrectionClient::new(self.transport.clone(), self.settings.api_base_url.clone())
    }

    pub(crate) fn release_feed(&self) -> Result<ReleaseFeed, AppError> {
        let repository = RepositorySlug::parse(&self.settings.repository)
            .ok_or_else(|| AppError::invalid_repository(&self.settings.repository))?;
        Ok(ReleaseFeed::new(self.transport.clone(), repository)
            .with_token(self.settings.github_token.clone())
            .with_forbidden_policy(self.settings.forbidden_policy))
    }

    /// Stored model, or the configured default.
    pub(crate) fn model(&self) -> Result<String, AppError> {
        let stored = self
            .data
            .model()
            .map_err(|error| AppError::store_failed("lecture du modèle", error))?;
        Ok(stored.unwrap_or_else(|| self.settings.default_model.clone()))
    }
}

/// Ask a yes/no question on stderr. Anything but an explicit yes is a no.
pub(crate) fn confirm(question: &str) -> Result<bool, AppError> {
    eprint!("{question} [o/N] ");
    std::io::stderr().flush().map_err(AppError::environment_unavailable)?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(AppError::environment_unavailable)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "o" | "oui" | "y" | "yes"
    )
}
