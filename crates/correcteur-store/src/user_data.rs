use chrono::Utc;
use correcteur_core::{ApiKey, CorrectionResult};
use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::records::{Category, DEFAULT_CATEGORY_ICON, GENERAL_CATEGORY_ID, HistoryEntry, Statistics};
use crate::store::{
    ConfigStore, KEY_API_KEY, KEY_CATEGORIES, KEY_HISTORY, KEY_MODEL, KEY_STATISTICS, StoreError,
};

pub const MAX_HISTORY_ENTRIES: usize = 500;

/// Typed access to the records kept in a [`ConfigStore`].
pub struct UserData<S> {
    store: S,
}

impl<S: ConfigStore> UserData<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(value) = self.store.get(key)? else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::InvalidRecord {
                key: key.to_string(),
                source,
            })
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(StoreError::Serialize)?;
        self.store.set(key, value)
    }

    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn api_key(&self) -> Result<Option<ApiKey>, StoreError> {
        Ok(self
            .read::<String>(KEY_API_KEY)?
            .filter(|key| !key.trim().is_empty())
            .map(ApiKey::new))
    }

    /// # Errors
    /// Returns an error if the store cannot be written.
    pub fn set_api_key(&self, key: &str) -> Result<(), StoreError> {
        info!("API key updated");
        self.write(KEY_API_KEY, &key.trim())
    }

    /// The model chosen by the user, if any.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn model(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .read::<String>(KEY_MODEL)?
            .filter(|model| !model.trim().is_empty()))
    }

    /// # Errors
    /// Returns an error if the store cannot be written.
    pub fn set_model(&self, model: &str) -> Result<(), StoreError> {
        debug!("Model set to {model}");
        self.write(KEY_MODEL, &model.trim())
    }

    /// Stored categories, or the single default category when none are saved.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self
            .read::<Vec<Category>>(KEY_CATEGORIES)?
            .filter(|categories| !categories.is_empty())
            .unwrap_or_else(|| vec![Category::general()]))
    }

    /// # Errors
    /// Returns an error if the store cannot be written.
    pub fn save_categories(&self, categories: &[Category]) -> Result<(), StoreError> {
        self.write(KEY_CATEGORIES, &categories)
    }

    /// Resolve a category for a correction. `None` picks the first enabled one.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidCategory`] when the category is unknown or disabled.
    pub fn select_category(&self, id: Option<&str>) -> Result<Category, StoreError> {
        let categories = self.categories()?;
        let selected = match id {
            Some(id) => categories.into_iter().find(|category| category.id == id),
            None => categories.into_iter().find(|category| category.enabled),
        };
        match selected {
            Some(category) if category.enabled => Ok(category),
            Some(category) => Err(StoreError::InvalidCategory(format!(
                "category '{}' is disabled",
                category.id
            ))),
            None if id.is_none() => Ok(Category::general()),
            None => Err(StoreError::InvalidCategory(format!(
                "no category with id '{}'",
                id.unwrap_or_default()
            ))),
        }
    }

    /// # Errors
    /// Returns [`StoreError::InvalidCategory`] when the name or preprompt is blank.
    pub fn add_category(
        &self,
        name: &str,
        preprompt: &str,
        icon: Option<&str>,
    ) -> Result<Category, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidCategory("name must not be empty".to_string()));
        }
        if preprompt.trim().is_empty() {
            return Err(StoreError::InvalidCategory(
                "preprompt must not be empty".to_string(),
            ));
        }

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            icon: icon.unwrap_or(DEFAULT_CATEGORY_ICON).to_string(),
            enabled: true,
            preprompt: preprompt.trim().to_string(),
        };
        let mut categories = self.categories()?;
        categories.push(category.clone());
        self.save_categories(&categories)?;
        info!("Category added: {} ({})", category.name, category.id);
        Ok(category)
    }

    /// Change the given fields of an existing category. Returns the updated
    /// category, or `None` when no category has `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidCategory`] when a given name or preprompt is blank.
    pub fn update_category(
        &self,
        id: &str,
        name: Option<&str>,
        preprompt: Option<&str>,
        icon: Option<&str>,
    ) -> Result<Option<Category>, StoreError> {
        if name.is_some_and(|name| name.trim().is_empty()) {
            return Err(StoreError::InvalidCategory("name must not be empty".to_string()));
        }
        if preprompt.is_some_and(|preprompt| preprompt.trim().is_empty()) {
            return Err(StoreError::InvalidCategory(
                "preprompt must not be empty".to_string(),
            ));
        }

        let mut categories = self.categories()?;
        let Some(category) = categories.iter_mut().find(|category| category.id == id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            category.name = name.trim().to_string();
        }
        if let Some(preprompt) = preprompt {
            category.preprompt = preprompt.trim().to_string();
        }
        if let Some(icon) = icon.map(str::trim).filter(|icon| !icon.is_empty()) {
            category.icon = icon.to_string();
        }
        let updated = category.clone();
        self.save_categories(&categories)?;
        info!("Category updated: {} ({})", updated.name, updated.id);
        Ok(Some(updated))
    }

    /// Returns whether a category was removed.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidCategory`] for the built-in category.
    pub fn remove_category(&self, id: &str) -> Result<bool, StoreError> {
        if id == GENERAL_CATEGORY_ID {
            return Err(StoreError::InvalidCategory(
                "the general category cannot be removed".to_string(),
            ));
        }
        let mut categories = self.categories()?;
        let before = categories.len();
        categories.retain(|category| category.id != id);
        if categories.len() == before {
            return Ok(false);
        }
        self.save_categories(&categories)?;
        Ok(true)
    }

    /// Returns whether a category with `id` exists.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub fn set_category_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let mut categories = self.categories()?;
        let Some(category) = categories.iter_mut().find(|category| category.id == id) else {
            return Ok(false);
        };
        category.enabled = enabled;
        self.save_categories(&categories)?;
        Ok(true)
    }

    /// Newest first.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.read(KEY_HISTORY)?.unwrap_or_default())
    }

    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn statistics(&self) -> Result<Statistics, StoreError> {
        Ok(self.read(KEY_STATISTICS)?.unwrap_or_default())
    }

    /// Count a finished correction and keep it in the history when it found
    /// mistakes. Returns the history entry, if one was written.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub fn record_correction(
        &self,
        category: &Category,
        original: &str,
        result: &CorrectionResult,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        let mut statistics = self.statistics()?;
        statistics.record(&result.mistakes, Utc::now());
        self.write(KEY_STATISTICS, &statistics)?;

        if result.mistakes.is_empty() {
            return Ok(None);
        }

        let entry = HistoryEntry::new(category, original, result);
        let mut history = self.history()?;
        history.insert(0, entry.clone());
        history.truncate(MAX_HISTORY_ENTRIES);
        self.write(KEY_HISTORY, &history)?;
        debug!(
            "History entry {} recorded with {} mistakes",
            entry.id,
            entry.mistakes.len()
        );
        Ok(Some(entry))
    }

    /// # Errors
    /// Returns an error if the store cannot be written.
    pub fn reset(&self, history: bool, statistics: bool) -> Result<(), StoreError> {
        if history {
            self.store.remove(KEY_HISTORY)?;
            info!("History cleared");
        }
        if statistics {
            self.store.remove(KEY_STATISTICS)?;
            info!("Statistics cleared");
        }
        Ok(())
    }
}
