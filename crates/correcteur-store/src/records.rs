use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use correcteur_core::{CorrectionResult, Mistake, MistakeKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GENERAL_CATEGORY_ID: &str = "general";
pub const DEFAULT_CATEGORY_ICON: &str = "FileText";

/// A named correction style. `preprompt` is sent as the category context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub preprompt: String,
}

fn default_icon() -> String {
    DEFAULT_CATEGORY_ICON.to_string()
}

fn default_enabled() -> bool {
    true
}

impl Category {
    #[must_use]
    pub fn general() -> Self {
        Self {
            id: GENERAL_CATEGORY_ID.to_string(),
            name: "Général".to_string(),
            icon: DEFAULT_CATEGORY_ICON.to_string(),
            enabled: true,
            preprompt: String::new(),
        }
    }

    /// Context to send with a correction, if this category carries one.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        let preprompt = self.preprompt.trim();
        (!preprompt.is_empty()).then_some(preprompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub category: String,
    pub category_name: String,
    pub original: String,
    pub corrected: String,
    #[serde(default)]
    pub mistakes: Vec<Mistake>,
    #[serde(default)]
    pub summary: String,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(category: &Category, original: &str, result: &CorrectionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: Utc::now(),
            category: category.id.clone(),
            category_name: category.name.clone(),
            original: original.to_string(),
            corrected: result.corrected_text.clone(),
            mistakes: result.mistakes.clone(),
            summary: result.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub total_corrections: u64,
    #[serde(default)]
    pub total_mistakes: u64,
    #[serde(default)]
    pub mistakes_by_kind: BTreeMap<MistakeKind, u64>,
    #[serde(default)]
    pub last_correction_at: Option<DateTime<Utc>>,
}

impl Statistics {
    pub fn record(&mut self, mistakes: &[Mistake], at: DateTime<Utc>) {
        self.total_corrections += 1;
        self.total_mistakes += mistakes.len() as u64;
        for mistake in mistakes {
            *self.mistakes_by_kind.entry(mistake.kind).or_insert(0) += 1;
        }
        self.last_correction_at = Some(at);
    }

    /// Mean mistakes per correction, `0.0` before the first one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_mistakes(&self) -> f64 {
        if self.total_corrections == 0 {
            0.0
        } else {
            self.total_mistakes as f64 / self.total_corrections as f64
        }
    }
}
