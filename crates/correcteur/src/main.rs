mod app;
mod cli;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use correcteur_platform::AppPaths;

use crate::app::Correcteur;
use crate::cli::Cli;
use crate::error::AppError;
use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match AppPaths::new() {
        Ok(paths) => {
            logging::init_logging(&paths, cli.debug);
            let settings = AppSettings::load(&paths.settings_file());
            logging::set_logging_enabled(cli.debug || settings.debug_logging);
            logging::limit_log_size(&paths, settings.max_log_size_bytes);
            match Correcteur::new(settings, paths) {
                Ok(app) => app.run(cli.command).await,
                Err(error) => Err(error),
            }
        }
        Err(error) => Err(AppError::environment_unavailable(error)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            eprintln!("Erreur : {error}");
            ExitCode::FAILURE
        }
    }
}
