//! Durable user data for Correcteur: API key, model, categories, correction
//! history and statistics.

mod records;
mod store;
mod tips;
mod user_data;

pub use records::{Category, DEFAULT_CATEGORY_ICON, GENERAL_CATEGORY_ID, HistoryEntry, Statistics};
pub use store::{
    ConfigStore, JsonFileStore, KEY_API_KEY, KEY_CATEGORIES, KEY_HISTORY, KEY_MODEL,
    KEY_STATISTICS, MemoryStore, StoreError,
};
pub use tips::{Tip, advice_for, personalized_tips};
pub use user_data::{MAX_HISTORY_ENTRIES, UserData};
