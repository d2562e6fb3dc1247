use std::sync::Arc;
use std::time::Duration;

use correcteur_core::download::{cleanup_stale_downloads, restart_app};
use correcteur_core::{
    ApplyResult, FailureKind, HttpArtifactDownloader, PlatformInstaller, ReleaseRecord,
    ReleaseSource, StateTransition, UpdateController, UpdateFailure, UpdateState,
    is_newer_version, user_agent,
};
use log::{info, warn};

use super::{Correcteur, confirm};
use crate::cli::UpdateCommand;
use crate::error::AppError;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

impl Correcteur {
    pub(super) async fn handle_update(&self, command: UpdateCommand) -> Result<(), AppError> {
        let controller = self.update_controller()?;
        cleanup_stale_downloads(&self.paths.updates_dir());

        match controller.check_for_updates().await {
            UpdateState::Available(release) => {
                print_available(&release);
                match command {
                    UpdateCommand::Check => Ok(()),
                    UpdateCommand::Install { yes } => {
                        install_update(&controller, &release, yes).await
                    }
                }
            }
            UpdateState::Failed(failure) => Err(AppError::update_check_failed(failure.message)),
            _ => {
                println!("Correcteur est à jour (version {CURRENT_VERSION}).");
                Ok(())
            }
        }
    }

    pub(super) async fn handle_releases(&self) -> Result<(), AppError> {
        let feed = self.release_feed()?;
        let releases = feed
            .fetch_releases()
            .await
            .map_err(AppError::update_check_failed)?;

        if releases.is_empty() {
            println!("Aucune version publiée.");
        }
        for release in &releases {
            println!("{}", release_line(release, CURRENT_VERSION));
        }
        Ok(())
    }

    fn update_controller(&self) -> Result<UpdateController, AppError> {
        let source: Arc<dyn ReleaseSource> = Arc::new(self.release_feed()?);

        // Connect timeout only, the installer body may stream for minutes.
        let download_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.settings.http_timeout_secs))
            .user_agent(user_agent())
            .build()
            .map_err(AppError::environment_unavailable)?;
        let downloader = Arc::new(HttpArtifactDownloader::new(
            download_client,
            self.paths.updates_dir(),
        ));

        Ok(
            UpdateController::new(CURRENT_VERSION, source, downloader, Arc::new(PlatformInstaller))
                .with_prereleases(self.settings.include_prereleases),
        )
    }
}

async fn install_update(
    controller: &UpdateController,
    release: &ReleaseRecord,
    yes: bool,
) -> Result<(), AppError> {
    if release.asset.is_none() {
        println!(
            "Aucun installateur pour cette plateforme, téléchargez la version ici : {}",
            release.download_url
        );
        controller
            .decline()
            .map_err(|error| AppError::auto_update_failed("téléchargement", error))?;
        return Ok(());
    }

    if !yes && !confirm(&format!("Télécharger {} ?", release.tag))? {
        controller
            .decline()
            .map_err(|error| AppError::auto_update_failed("téléchargement", error))?;
        println!("Mise à jour ignorée.");
        return Ok(());
    }

    let downloaded = match download_with_progress(controller).await? {
        UpdateState::Downloaded(update) => update,
        UpdateState::Failed(failure) => return Err(download_failure(failure)),
        other => {
            return Err(AppError::auto_update_failed(
                "téléchargement",
                format!("état inattendu : {}", other.name()),
            ));
        }
    };

    if !yes && !confirm("Installer maintenant ?")? {
        controller
            .defer_install()
            .map_err(|error| AppError::auto_update_failed("installation", error))?;
        println!(
            "Installateur conservé : {}",
            downloaded.artifact_path.display()
        );
        return Ok(());
    }

    let applied = controller
        .install()
        .map_err(|error| AppError::auto_update_failed("installation", error))?;
    match applied {
        ApplyResult::RestartRequired => {
            info!("Update {} applied, restarting", downloaded.release.tag);
            println!("Mise à jour {} installée, redémarrage.", downloaded.release.tag);
            restart_app(["update", "check"])
                .map_err(|error| AppError::auto_update_failed("redémarrage", error))
        }
        ApplyResult::ExitForInstaller => {
            println!("Installateur lancé, terminez l'installation puis relancez Correcteur.");
            Ok(())
        }
    }
}

/// Run the download while echoing progress transitions on stderr.
async fn download_with_progress(controller: &UpdateController) -> Result<UpdateState, AppError> {
    let mut events = controller.subscribe();
    let download = controller.download();
    tokio::pin!(download);

    let state = loop {
        tokio::select! {
            result = &mut download => {
                break result.map_err(|error| AppError::auto_update_failed("téléchargement", error))?;
            }
            event = events.recv() => match event {
                Ok(StateTransition {
                    current: UpdateState::Downloading { percent, .. },
                    ..
                }) => eprint!("\rTéléchargement : {percent:>3} %"),
                Ok(_) => {}
                Err(error) => warn!("Missed update progress events: {error}"),
            },
        }
    };
    eprintln!();
    Ok(state)
}

fn download_failure(failure: UpdateFailure) -> AppError {
    let phase = match failure.kind {
        FailureKind::Checksum => "vérification",
        FailureKind::Install => "installation",
        FailureKind::Download | FailureKind::Feed(_) => "téléchargement",
    };
    AppError::auto_update_failed(phase, failure.message)
}

fn print_available(release: &ReleaseRecord) {
    println!(
        "Nouvelle version disponible : {} (version actuelle : {CURRENT_VERSION})",
        release.tag
    );
    let notes = release.notes.trim();
    if !notes.is_empty() {
        println!("\n{notes}\n");
    }
    println!("{}", release.html_url);
}

fn release_line(release: &ReleaseRecord, current_version: &str) -> String {
    let marker = if is_newer_version(&release.tag, current_version) {
        "*"
    } else {
        " "
    };
    let date = release
        .published_at
        .map_or_else(|| "----------".to_string(), |at| at.format("%Y-%m-%d").to_string());
    let prerelease = if release.prerelease {
        " (préversion)"
    } else {
        ""
    };
    format!("{marker} {:<12} {date}  {}{prerelease}", release.tag, release.name)
}
