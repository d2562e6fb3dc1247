use correcteur_core::{CorrectionResult, Mistake, MistakeKind};
use correcteur_store::{Category, JsonFileStore, UserData, personalized_tips};
use tempfile::tempdir;

fn result(kinds: &[MistakeKind]) -> CorrectionResult {
    CorrectionResult {
        corrected_text: "Les enfants sont partis.".to_string(),
        mistakes: kinds
            .iter()
            .map(|kind| Mistake {
                kind: *kind,
                original: "partit".to_string(),
                replacement: "partis".to_string(),
                explanation: "Accord du participe avec le sujet.".to_string(),
            })
            .collect(),
        summary: "Accord corrigé.".to_string(),
    }
}

#[test]
fn records_survive_reopening_the_store() {
    let temp_dir = tempdir().expect("create temp dir");
    let path = temp_dir.path().join("store.json");

    let data = UserData::new(JsonFileStore::open(&path).expect("open store"));
    data.set_api_key("sk-0123456789").expect("save key");
    let category = data
        .add_category("Rapport", "Style formel.", Some("Briefcase"))
        .expect("add category");
    data.record_correction(
        &category,
        "Les enfants sont partit.",
        &result(&[MistakeKind::Agreement]),
    )
    .expect("record correction");
    data.record_correction(
        &Category::general(),
        "Bonjour,",
        &result(&[MistakeKind::Agreement, MistakeKind::Punctuation]),
    )
    .expect("record correction");
    drop(data);

    let data = UserData::new(JsonFileStore::open(&path).expect("reopen store"));
    assert!(data.api_key().expect("read key").is_some());
    assert_eq!(data.categories().expect("categories").len(), 2);

    let history = data.history().expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].category, "general");
    assert_eq!(history[1].category_name, "Rapport");

    let statistics = data.statistics().expect("statistics");
    assert_eq!(statistics.total_corrections, 2);
    assert_eq!(statistics.total_mistakes, 3);

    let tips = personalized_tips(&history);
    assert_eq!(tips[0].kind, MistakeKind::Agreement);
    assert_eq!(tips[0].count, 2);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read store file"))
            .expect("store file is json");
    assert!(raw.get("apiKey").is_some());
    assert!(raw["history"].is_array());
    assert_eq!(raw["statistics"]["totalMistakes"], 3);
}
