use std::collections::BTreeMap;

use correcteur_core::MistakeKind;

use crate::records::HistoryEntry;

const MAX_TIPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tip {
    pub kind: MistakeKind,
    pub count: u64,
    pub advice: &'static str,
}

#[must_use]
pub fn advice_for(kind: MistakeKind) -> &'static str {
    match kind {
        MistakeKind::Spelling => {
            "Relisez vos textes à voix haute pour détecter les fautes d'orthographe. \
             Utilisez un dictionnaire en cas de doute."
        }
        MistakeKind::Grammar => {
            "Révisez les règles de grammaire de base, notamment l'accord sujet-verbe \
             et les compléments."
        }
        MistakeKind::Conjugation => {
            "Concentrez-vous sur les temps verbaux les plus utilisés : présent, \
             passé composé, imparfait et futur."
        }
        MistakeKind::Agreement => {
            "Identifiez toujours le sujet avant d'accorder le verbe. \
             Attention aux sujets inversés ou éloignés."
        }
        MistakeKind::Punctuation => {
            "La virgule sépare les éléments d'une énumération et encadre les \
             propositions incises."
        }
        MistakeKind::Syntax => "Variez la structure de vos phrases et évitez les répétitions.",
        MistakeKind::Style => "Privilégiez les phrases courtes et directes pour plus de clarté.",
    }
}

/// The most frequent mistake kinds across `history`, with advice for each.
///
/// Ties keep the canonical kind order.
#[must_use]
pub fn personalized_tips(history: &[HistoryEntry]) -> Vec<Tip> {
    let mut counts: BTreeMap<MistakeKind, u64> = BTreeMap::new();
    for mistake in history.iter().flat_map(|entry| &entry.mistakes) {
        *counts.entry(mistake.kind).or_insert(0) += 1;
    }

    let mut ranked: Vec<(MistakeKind, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(MAX_TIPS)
        .map(|(kind, count)| Tip {
            kind,
            count,
            advice: advice_for(kind),
        })
        .collect()
}
