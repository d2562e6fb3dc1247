use std::io::Read;

use correcteur_core::{CorrectionError, CorrectionRequest, CorrectionResult};
use log::{debug, info, warn};

use super::Correcteur;
use crate::error::AppError;

impl Correcteur {
    pub(super) async fn handle_correct(
        &self,
        category_id: Option<&str>,
        text: Option<String>,
    ) -> Result<(), AppError> {
        let source_text = resolve_text(text, std::io::stdin().lock())?;
        let result = self.correct(category_id, &source_text).await?;

        println!("{}", result.corrected_text);
        eprintln!("{}", render_report(&result));
        Ok(())
    }

    /// Correct `source_text` in the given category and record the outcome.
    pub(super) async fn correct(
        &self,
        category_id: Option<&str>,
        source_text: &str,
    ) -> Result<CorrectionResult, AppError> {
        let category = self
            .data
            .select_category(category_id)
            .map_err(|error| AppError::store_failed("choix de la catégorie", error))?;
        let api_key = self
            .data
            .api_key()
            .map_err(|error| AppError::store_failed("lecture de la clé API", error))?;

        let request = CorrectionRequest {
            source_text: source_text.to_string(),
            category_context: category.context().map(ToString::to_string),
            model_id: self.model()?,
            api_key,
        };
        debug!("Correcting in category {}", category.id);

        let result = self
            .correction_client()
            .correct(&request)
            .await
            .map_err(|error| match error {
                CorrectionError::MissingCredential => AppError::MissingApiKey,
                other => AppError::correction_failed(other),
            })?;

        // A failed history write must not lose the correction itself.
        match self.data.record_correction(&category, source_text, &result) {
            Ok(Some(entry)) => info!("Correction saved to history as {}", entry.id),
            Ok(None) => {}
            Err(error) => warn!("Correction not recorded: {error}"),
        }
        Ok(result)
    }
}

/// The text argument, or all of `input` when it is absent or `-`.
fn resolve_text(text: Option<String>, mut input: impl Read) -> Result<String, AppError> {
    match text {
        Some(text) if text != "-" => Ok(text),
        _ => {
            let mut buffer = String::new();
            input
                .read_to_string(&mut buffer)
                .map_err(AppError::environment_unavailable)?;
            Ok(buffer)
        }
    }
}

fn render_report(result: &CorrectionResult) -> String {
    let mut report = String::new();
    if result.mistakes.is_empty() {
        report.push_str("Aucune faute détectée.\n");
    } else {
        report.push_str(&format!("{} faute(s) :\n", result.mistakes.len()));
        for mistake in &result.mistakes {
            report.push_str(&format!(
                "  [{}] {} -> {}",
                mistake.kind, mistake.original, mistake.replacement
            ));
            if !mistake.explanation.is_empty() {
                report.push_str(&format!(" ({})", mistake.explanation));
            }
            report.push('\n');
        }
    }
    report.push_str(&result.summary);
    report
}
