use std::fmt::Write as _;

use correcteur_core::KeyValidation;
use correcteur_store::{
    Category, HistoryEntry, Statistics, StoreError, Tip, personalized_tips,
};
use log::warn;

use super::Correcteur;
use crate::cli::{CategoryCommand, KeyCommand, ModelCommand};
use crate::error::AppError;

impl Correcteur {
    pub(super) async fn handle_key(&self, command: KeyCommand) -> Result<(), AppError> {
        match command {
            KeyCommand::Set { key } => {
                let note = self.store_api_key(&key).await?;
                match note {
                    Some(reason) => {
                        println!("Clé API enregistrée sans vérification : {reason}");
                    }
                    None => println!("Clé API vérifiée et enregistrée."),
                }
                Ok(())
            }
            KeyCommand::Validate { key } => {
                let key = match key {
                    Some(key) => key,
                    None => self
                        .data
                        .api_key()
                        .map_err(|error| AppError::store_failed("lecture de la clé API", error))?
                        .ok_or(AppError::MissingApiKey)?
                        .expose()
                        .to_string(),
                };
                match self.correction_client().validate_api_key(&key).await {
                    KeyValidation::Valid => {
                        println!("Clé API valide.");
                        Ok(())
                    }
                    KeyValidation::Invalid(reason) => {
                        Err(AppError::invalid_api_key(reason.to_string()))
                    }
                }
            }
        }
    }

    /// Validate then save `key`. A key that could not be checked is still
    /// saved and the reason returned; a key known to be wrong is refused.
    pub(super) async fn store_api_key(&self, key: &str) -> Result<Option<String>, AppError> {
        let note = match self.correction_client().validate_api_key(key).await {
            KeyValidation::Valid => None,
            KeyValidation::Invalid(reason) if reason.is_key_wrong() => {
                return Err(AppError::invalid_api_key(reason.to_string()));
            }
            KeyValidation::Invalid(reason) => {
                warn!("Saving API key without verification: {reason}");
                Some(reason.to_string())
            }
        };
        self.data
            .set_api_key(key)
            .map_err(|error| AppError::store_failed("enregistrement de la clé API", error))?;
        Ok(note)
    }

    pub(super) fn handle_model(&self, command: ModelCommand) -> Result<(), AppError> {
        match command {
            ModelCommand::Set { model } => {
                let model = model.trim();
                if model.is_empty() {
                    return Err(AppError::from("Le nom du modèle ne peut pas être vide"));
                }
                self.data
                    .set_model(model)
                    .map_err(|error| AppError::store_failed("enregistrement du modèle", error))?;
                println!("Modèle enregistré : {model}");
            }
            ModelCommand::Show => println!("{}", self.model()?),
        }
        Ok(())
    }

    pub(super) fn handle_category(&self, command: CategoryCommand) -> Result<(), AppError> {
        let store_failed =
            |error: StoreError| AppError::store_failed("mise à jour des catégories", error);
        match command {
            CategoryCommand::List => {
                let categories = self
                    .data
                    .categories()
                    .map_err(|error| AppError::store_failed("lecture des catégories", error))?;
                for category in &categories {
                    println!("{}", category_line(category));
                }
            }
            CategoryCommand::Add {
                name,
                preprompt,
                icon,
            } => {
                let category = self
                    .data
                    .add_category(&name, &preprompt, icon.as_deref())
                    .map_err(store_failed)?;
                println!("Catégorie ajoutée : {} ({})", category.name, category.id);
            }
            CategoryCommand::Edit {
                id,
                name,
                preprompt,
                icon,
            } => {
                if name.is_none() && preprompt.is_none() && icon.is_none() {
                    return Err(AppError::from(
                        "Rien à modifier : précisez --name, --preprompt ou --icon",
                    ));
                }
                let category = self
                    .data
                    .update_category(
                        &id,
                        name.as_deref(),
                        preprompt.as_deref(),
                        icon.as_deref(),
                    )
                    .map_err(store_failed)?
                    .ok_or_else(|| unknown_category(&id))?;
                println!("Catégorie modifiée : {} ({})", category.name, category.id);
            }
            CategoryCommand::Remove { id } => {
                if !self.data.remove_category(&id).map_err(store_failed)? {
                    return Err(unknown_category(&id));
                }
                println!("Catégorie supprimée : {id}");
            }
            CategoryCommand::Enable { id } => self.toggle_category(&id, true)?,
            CategoryCommand::Disable { id } => self.toggle_category(&id, false)?,
        }
        Ok(())
    }

    fn toggle_category(&self, id: &str, enabled: bool) -> Result<(), AppError> {
        let found = self
            .data
            .set_category_enabled(id, enabled)
            .map_err(|error| AppError::store_failed("mise à jour des catégories", error))?;
        if !found {
            return Err(unknown_category(id));
        }
        let state = if enabled { "activée" } else { "désactivée" };
        println!("Catégorie {id} {state}");
        Ok(())
    }

    pub(super) fn handle_history(&self, limit: usize) -> Result<(), AppError> {
        let history = self
            .data
            .history()
            .map_err(|error| AppError::store_failed("lecture de l'historique", error))?;
        if history.is_empty() {
            println!("Historique vide.");
        }
        for entry in history.iter().take(limit) {
            println!("{}", history_block(entry));
        }
        Ok(())
    }

    pub(super) fn handle_stats(&self) -> Result<(), AppError> {
        let statistics = self
            .data
            .statistics()
            .map_err(|error| AppError::store_failed("lecture des statistiques", error))?;
        let history = self
            .data
            .history()
            .map_err(|error| AppError::store_failed("lecture de l'historique", error))?;
        print!(
            "{}",
            statistics_report(&statistics, &personalized_tips(&history))
        );
        Ok(())
    }

    pub(super) fn handle_reset(&self, history: bool, statistics: bool) -> Result<(), AppError> {
        let (history, statistics) = if history || statistics {
            (history, statistics)
        } else {
            (true, true)
        };
        self.data
            .reset(history, statistics)
            .map_err(|error| AppError::store_failed("réinitialisation", error))?;
        println!("Données réinitialisées.");
        Ok(())
    }
}

fn unknown_category(id: &str) -> AppError {
    AppError::from(format!("Aucune catégorie avec l'identifiant {id}"))
}

fn category_line(category: &Category) -> String {
    let status = if category.enabled { "+" } else { "-" };
    let mut line = format!("{status} {:<36}  {}", category.id, category.name);
    if let Some(context) = category.context() {
        let _ = write!(line, "\n    {context}");
    }
    line
}

fn history_block(entry: &HistoryEntry) -> String {
    format!(
        "{}  {}  {} faute(s)\n  - {}\n  + {}\n",
        entry.date.format("%Y-%m-%d %H:%M"),
        entry.category_name,
        entry.mistakes.len(),
        entry.original.trim(),
        entry.corrected.trim()
    )
}

fn statistics_report(statistics: &Statistics, tips: &[Tip]) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "Corrections : {}", statistics.total_corrections);
    let _ = writeln!(report, "Fautes : {}", statistics.total_mistakes);
    let _ = writeln!(
        report,
        "Moyenne par correction : {:.1}",
        statistics.average_mistakes()
    );
    if let Some(at) = statistics.last_correction_at {
        let _ = writeln!(report, "Dernière correction : {}", at.format("%Y-%m-%d %H:%M"));
    }

    let mut by_kind: Vec<_> = statistics.mistakes_by_kind.iter().collect();
    by_kind.sort_by(|a, b| b.1.cmp(a.1));
    for (kind, count) in by_kind {
        let _ = writeln!(report, "  {kind} : {count}");
    }

    if !tips.is_empty() {
        let _ = writeln!(report, "\nConseils :");
        for tip in tips {
            let _ = writeln!(report, "  [{}, {} fois] {}", tip.kind, tip.count, tip.advice);
        }
    }
    report
}
