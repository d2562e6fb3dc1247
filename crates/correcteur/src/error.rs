#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorDetail {
    Message(String),
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
    Correction(correcteur_core::CorrectionError),
}

impl std::fmt::Display for AppErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Io { kind, message } => write!(f, "{kind}: {message}"),
            Self::Correction(error) => write!(f, "{error}"),
        }
    }
}

impl From<String> for AppErrorDetail {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppErrorDetail {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<std::io::Error> for AppErrorDetail {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<correcteur_core::CorrectionError> for AppErrorDetail {
    fn from(value: correcteur_core::CorrectionError) -> Self {
        Self::Correction(value)
    }
}

impl From<correcteur_core::FeedError> for AppErrorDetail {
    fn from(value: correcteur_core::FeedError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<correcteur_core::UpdateError> for AppErrorDetail {
    fn from(value: correcteur_core::UpdateError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<correcteur_core::DownloadError> for AppErrorDetail {
    fn from(value: correcteur_core::DownloadError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<correcteur_core::TransportError> for AppErrorDetail {
    fn from(value: correcteur_core::TransportError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<correcteur_store::StoreError> for AppErrorDetail {
    fn from(value: correcteur_store::StoreError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<correcteur_platform::AppPathsError> for AppErrorDetail {
    fn from(value: correcteur_platform::AppPathsError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<reqwest::Error> for AppErrorDetail {
    fn from(value: reqwest::Error) -> Self {
        Self::Message(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Message(String),
    EnvironmentUnavailable {
        reason: AppErrorDetail,
    },
    InvalidRepository {
        input: String,
    },
    StoreFailed {
        action: &'static str,
        details: AppErrorDetail,
    },
    MissingApiKey,
    InvalidApiKey {
        details: AppErrorDetail,
    },
    CorrectionFailed {
        details: AppErrorDetail,
    },
    UpdateCheckFailed {
        details: AppErrorDetail,
    },
    AutoUpdateFailed {
        phase: &'static str,
        details: AppErrorDetail,
    },
}

impl AppError {
    pub fn environment_unavailable(reason: impl Into<AppErrorDetail>) -> Self {
        Self::EnvironmentUnavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_repository(input: impl Into<String>) -> Self {
        Self::InvalidRepository {
            input: input.into(),
        }
    }

    pub fn store_failed(action: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::StoreFailed {
            action,
            details: details.into(),
        }
    }

    pub fn invalid_api_key(details: impl Into<AppErrorDetail>) -> Self {
        Self::InvalidApiKey {
            details: details.into(),
        }
    }

    pub fn correction_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::CorrectionFailed {
            details: details.into(),
        }
    }

    pub fn update_check_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::UpdateCheckFailed {
            details: details.into(),
        }
    }

    pub fn auto_update_failed(phase: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::AutoUpdateFailed {
            phase,
            details: details.into(),
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::EnvironmentUnavailable { reason } => {
                write!(f, "Environnement indisponible : {reason}")
            }
            Self::InvalidRepository { input } => {
                write!(f, "Dépôt GitHub invalide : {input} (attendu : owner/repo)")
            }
            Self::StoreFailed { action, details } => {
                write!(f, "Données utilisateur, {action} impossible : {details}")
            }
            Self::MissingApiKey => write!(
                f,
                "Aucune clé API configurée, utilisez `correcteur key set <CLÉ>`"
            ),
            Self::InvalidApiKey { details } => write!(f, "Clé API refusée : {details}"),
            Self::CorrectionFailed { details } => write!(f, "Correction échouée : {details}"),
            Self::UpdateCheckFailed { details } => {
                write!(f, "Vérification des mises à jour échouée : {details}")
            }
            Self::AutoUpdateFailed { phase, details } => {
                write!(f, "Mise à jour ({phase}) échouée : {details}")
            }
        }
    }
}

impl std::error::Error for AppError {}
