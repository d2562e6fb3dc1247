use std::path::Path;

use correcteur_core::{DEFAULT_API_BASE_URL, DEFAULT_MODEL, ForbiddenPolicy};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REPOSITORY: &str = "Correcteur-app/correcteur";

#[derive(Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_repository")]
    pub repository: String,

    #[serde(default)]
    pub github_token: Option<String>,

    #[serde(default)]
    pub include_prereleases: bool,

    #[serde(default)]
    pub forbidden_policy: ForbiddenPolicy,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            github_token: None,
            include_prereleases: false,
            forbidden_policy: ForbiddenPolicy::default(),
            api_base_url: default_api_base_url(),
            default_model: default_model(),
            http_timeout_secs: default_http_timeout(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("repository", &self.repository)
            .field("github_token", &mask_secret(self.github_token.as_deref()))
            .field("include_prereleases", &self.include_prereleases)
            .field("forbidden_policy", &self.forbidden_policy)
            .field("api_base_url", &self.api_base_url)
            .field("default_model", &self.default_model)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("debug_logging", &self.debug_logging)
            .field("max_log_size_bytes", &self.max_log_size_bytes)
            .finish()
    }
}

/// `***` for a configured secret, `none` otherwise.
#[must_use]
pub fn mask_secret(secret: Option<&str>) -> &'static str {
    match secret {
        Some(secret) if !secret.trim().is_empty() => "***",
        _ => "none",
    }
}

impl AppSettings {
    /// Defaults, then the settings file, then environment overrides.
    pub fn load(path: &Path) -> Self {
        let mut settings = Self::from_file(path);
        settings.apply_env(|name| std::env::var(name).ok());
        settings
    }

    pub fn from_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                warn!("Invalid settings file {}: {error}", path.display());
                Self::default()
            }),
            Err(error) => {
                warn!("Unreadable settings file {}: {error}", path.display());
                Self::default()
            }
        }
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(repository) = var("CORRECTEUR_REPOSITORY") {
            debug!("Repository overridden by environment: {repository}");
            self.repository = repository;
        }
        if let Some(token) = var("GITHUB_TOKEN").or_else(|| var("GH_TOKEN")) {
            debug!("GitHub token provided by environment");
            self.github_token = Some(token);
        }
        if let Some(base_url) = var("CORRECTEUR_API_BASE_URL") {
            debug!("API base URL overridden by environment: {base_url}");
            self.api_base_url = base_url.trim_end_matches('/').to_string();
        }
    }
}
