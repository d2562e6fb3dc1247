use std::fmt;

use log::{debug, warn};
use reqwest::StatusCode;

use crate::correction::CorrectionClient;
use crate::http::HttpRequest;

pub const MIN_API_KEY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidKeyReason {
    TooShort,
    /// The endpoint answered 401.
    Rejected,
    /// The endpoint answered, but not with a verdict about the key.
    Unverified { status: StatusCode },
    /// No answer at all.
    Unreachable { details: String },
}

impl InvalidKeyReason {
    /// True when the key itself is known to be wrong, as opposed to "could not check".
    #[must_use]
    pub fn is_key_wrong(&self) -> bool {
        matches!(self, Self::TooShort | Self::Rejected)
    }
}

impl fmt::Display for InvalidKeyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "Clé API trop courte"),
            Self::Rejected => write!(f, "Clé API invalide"),
            Self::Unverified { status } => write!(f, "Erreur de validation : HTTP {status}"),
            Self::Unreachable { details } => write!(
                f,
                "Impossible de valider la clé, vérifiez votre connexion ({details})"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValidation {
    Valid,
    Invalid(InvalidKeyReason),
}

impl KeyValidation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl CorrectionClient {
    /// Check an API key against the model-list endpoint.
    ///
    /// Keys shorter than [`MIN_API_KEY_LEN`] are rejected without a request.
    pub async fn validate_api_key(&self, api_key: &str) -> KeyValidation {
        let api_key = api_key.trim();
        if api_key.chars().count() < MIN_API_KEY_LEN {
            return KeyValidation::Invalid(InvalidKeyReason::TooShort);
        }

        let request = HttpRequest::get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"));

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                debug!("API key accepted by model-list endpoint");
                KeyValidation::Valid
            }
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                KeyValidation::Invalid(InvalidKeyReason::Rejected)
            }
            Ok(response) => {
                warn!("API key validation returned HTTP {}", response.status);
                KeyValidation::Invalid(InvalidKeyReason::Unverified {
                    status: response.status,
                })
            }
            Err(error) => {
                warn!("API key validation failed: {error}");
                KeyValidation::Invalid(InvalidKeyReason::Unreachable {
                    details: error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::correction::DEFAULT_API_BASE_URL;
    use crate::http::HttpTransport;
    use crate::http::fake::ScriptedTransport;

    fn client(transport: &Arc<ScriptedTransport>) -> CorrectionClient {
        let transport: Arc<dyn HttpTransport> = transport.clone();
        CorrectionClient::new(transport, DEFAULT_API_BASE_URL)
    }

    #[tokio::test]
    async fn short_key_is_rejected_without_request() {
        let transport = Arc::new(ScriptedTransport::respond(200, "{}"));

        let result = client(&transport).validate_api_key("  abc  ").await;

        assert_eq!(result, KeyValidation::Invalid(InvalidKeyReason::TooShort));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn success_status_means_valid() {
        let transport = Arc::new(ScriptedTransport::respond(200, r#"{"data":[]}"#));

        let result = client(&transport).validate_api_key("0123456789abcdef").await;

        assert!(result.is_valid());
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.mistral.ai/v1/models");
        assert_eq!(
            sent.header_value("authorization"),
            Some("Bearer 0123456789abcdef")
        );
    }

    #[tokio::test]
    async fn wrong_key_and_unverifiable_key_are_distinguished() {
        let transport = Arc::new(ScriptedTransport::respond(401, "{}"));
        let rejected = client(&transport).validate_api_key("0123456789abcdef").await;

        let transport = Arc::new(ScriptedTransport::respond(503, ""));
        let unverified = client(&transport).validate_api_key("0123456789abcdef").await;

        let transport = Arc::new(ScriptedTransport::unreachable());
        let unreachable = client(&transport).validate_api_key("0123456789abcdef").await;

        let KeyValidation::Invalid(rejected) = rejected else {
            panic!("401 should be invalid");
        };
        let KeyValidation::Invalid(unverified) = unverified else {
            panic!("503 should be invalid");
        };
        let KeyValidation::Invalid(unreachable) = unreachable else {
            panic!("transport error should be invalid");
        };

        assert_eq!(rejected, InvalidKeyReason::Rejected);
        assert!(rejected.is_key_wrong());
        assert!(matches!(
            unverified,
            InvalidKeyReason::Unverified { status } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(!unverified.is_key_wrong());
        assert!(matches!(unreachable, InvalidKeyReason::Unreachable { .. }));
        assert!(!unreachable.is_key_wrong());

        assert_ne!(rejected.to_string(), unverified.to_string());
        assert_ne!(rejected.to_string(), unreachable.to_string());
        assert_ne!(unverified.to_string(), unreachable.to_string());
    }
}
