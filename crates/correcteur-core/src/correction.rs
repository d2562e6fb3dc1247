use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};

pub const DEFAULT_API_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_MODEL: &str = "mistral-large-latest";
pub const FALLBACK_SUMMARY: &str = "Correction effectuée.";

const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 4096;

const SYSTEM_PROMPT: &str = r#"Tu es un correcteur expert de la langue française, spécialisé en orthographe et en grammaire.

Réponds TOUJOURS avec un unique objet JSON valide, sans aucun texte autour, de la forme :
{
  "correctedText": "le texte entièrement corrigé",
  "mistakes": [
    {
      "type": "orthographe|grammaire|conjugaison|syntaxe|ponctuation|accord|style",
      "original": "le passage fautif",
      "correction": "le passage corrigé",
      "explanation": "la règle qui s'applique"
    }
  ],
  "summary": "un bref bilan des corrections"
}

Consignes :
- "correctedText" contient le texte complet corrigé, prêt à être copié.
- "mistakes" recense chaque faute ; "type" prend obligatoirement une des sept valeurs listées.
- Sans aucune faute, "mistakes" vaut [].
- "summary" résume les types d'erreurs et donne un conseil."#;

/// API key that never shows up in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub source_text: String,
    pub category_context: Option<String>,
    pub model_id: String,
    pub api_key: Option<ApiKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MistakeKind {
    #[serde(rename = "orthographe", alias = "spelling")]
    Spelling,
    #[serde(rename = "grammaire", alias = "grammar")]
    Grammar,
    #[serde(rename = "conjugaison", alias = "conjugation")]
    Conjugation,
    #[serde(rename = "syntaxe", alias = "syntax")]
    Syntax,
    #[serde(rename = "ponctuation", alias = "punctuation")]
    Punctuation,
    #[serde(rename = "accord", alias = "agreement")]
    Agreement,
    #[serde(rename = "style")]
    Style,
}

impl MistakeKind {
    pub const ALL: [Self; 7] = [
        Self::Spelling,
        Self::Grammar,
        Self::Conjugation,
        Self::Syntax,
        Self::Punctuation,
        Self::Agreement,
        Self::Style,
    ];

    /// Match a model-supplied label, French or English, ignoring case.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == label || kind.english_label() == label)
    }

    fn english_label(self) -> &'static str {
        match self {
            Self::Spelling => "spelling",
            Self::Grammar => "grammar",
            Self::Conjugation => "conjugation",
            Self::Syntax => "syntax",
            Self::Punctuation => "punctuation",
            Self::Agreement => "agreement",
            Self::Style => "style",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spelling => "orthographe",
            Self::Grammar => "grammaire",
            Self::Conjugation => "conjugaison",
            Self::Syntax => "syntaxe",
            Self::Punctuation => "ponctuation",
            Self::Agreement => "accord",
            Self::Style => "style",
        }
    }
}

impl fmt::Display for MistakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mistake {
    #[serde(rename = "type")]
    pub kind: MistakeKind,
    pub original: String,
    #[serde(rename = "correction")]
    pub replacement: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResult {
    pub corrected_text: String,
    pub mistakes: Vec<Mistake>,
    pub summary: String,
}

/// The model's reply before validation: every field may be missing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCorrection {
    #[serde(default)]
    corrected_text: Option<String>,
    #[serde(default)]
    mistakes: Option<serde_json::Value>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct RawMistake {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    original: Option<String>,
    #[serde(default)]
    correction: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

impl RawMistake {
    fn into_mistake(self) -> Option<Mistake> {
        let Some(kind) = self.kind.as_deref().and_then(MistakeKind::from_label) else {
            warn!("Dropping mistake with unknown kind {:?}", self.kind);
            return None;
        };
        Some(Mistake {
            kind,
            original: self.original.unwrap_or_default(),
            replacement: self.correction.unwrap_or_default(),
            explanation: self.explanation.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Coarse failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Input,
    Auth,
    Quota,
    Request,
    Upstream,
    ResponseFormat,
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectionError {
    #[error("Le texte à corriger est vide")]
    EmptyInput,
    #[error("Clé API non configurée")]
    MissingCredential,
    #[error("Clé API invalide, vérifiez-la dans les paramètres")]
    InvalidCredential,
    #[error("Limite de requêtes atteinte, réessayez dans quelques instants")]
    RateLimited,
    #[error("Requête invalide{}", detail_suffix(.0.as_deref()))]
    BadRequest(Option<String>),
    #[error("Erreur API {status}{}", detail_suffix(.detail.as_deref()))]
    Upstream {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("Réponse de l'IA illisible ({0}), réessayez")]
    MalformedResponse(String),
    #[error("Service injoignable, vérifiez votre connexion ({0})")]
    Transport(#[source] TransportError),
}

fn detail_suffix(detail: Option<&str>) -> String {
    detail.map(|detail| format!(" : {detail}")).unwrap_or_default()
}

impl CorrectionError {
    fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedResponse(details.into())
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyInput | Self::MissingCredential => ErrorClass::Input,
            Self::InvalidCredential => ErrorClass::Auth,
            Self::RateLimited => ErrorClass::Quota,
            Self::BadRequest(_) => ErrorClass::Request,
            Self::Upstream { .. } => ErrorClass::Upstream,
            Self::MalformedResponse(_) => ErrorClass::ResponseFormat,
            Self::Transport(_) => ErrorClass::Transport,
        }
    }
}

/// Client for the chat-completion endpoint. Holds no per-call state.
#[derive(Clone)]
pub struct CorrectionClient {
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) base_url: String,
}

impl CorrectionClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Correct `request.source_text` with the configured model.
    ///
    /// # Errors
    /// Input problems are reported before any network call. Otherwise the
    /// HTTP status, transport failure or unusable model output is mapped to
    /// a [`CorrectionError`] variant.
    pub async fn correct(
        &self,
        request: &CorrectionRequest,
    ) -> Result<CorrectionResult, CorrectionError> {
        if request.source_text.trim().is_empty() {
            return Err(CorrectionError::EmptyInput);
        }
        let api_key = request
            .api_key
            .as_ref()
            .filter(|key| !key.is_blank())
            .ok_or(CorrectionError::MissingCredential)?;

        let body = json!({
            "model": request.model_id,
            "messages": [
                {"role": "system", "content": system_prompt(request.category_context.as_deref())},
                {"role": "user", "content": format!("Corrige ce texte:\n\n{}", request.source_text)},
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "response_format": {"type": "json_object"},
        });
        let http_request =
            HttpRequest::post_json(format!("{}/chat/completions", self.base_url), &body)
                .map_err(|error| CorrectionError::malformed(error.to_string()))?
                .header("Authorization", format!("Bearer {}", api_key.expose()));

        debug!(
            "Requesting correction of {} chars with model {}",
            request.source_text.chars().count(),
            request.model_id
        );
        let response = self
            .transport
            .send(http_request)
            .await
            .map_err(CorrectionError::Transport)?;

        if !response.is_success() {
            let error = classify_failure(&response);
            warn!("Correction request failed: {error}");
            return Err(error);
        }

        let result = parse_completion(&response.body)?;
        info!(
            "Correction completed with {} mistake(s)",
            result.mistakes.len()
        );
        Ok(result)
    }
}

pub(crate) fn system_prompt(category_context: Option<&str>) -> String {
    match category_context.map(str::trim).filter(|context| !context.is_empty()) {
        Some(context) => format!("{SYSTEM_PROMPT}\n\nContexte spécifique: {context}"),
        None => SYSTEM_PROMPT.to_string(),
    }
}

fn classify_failure(response: &HttpResponse) -> CorrectionError {
    match response.status {
        StatusCode::UNAUTHORIZED => CorrectionError::InvalidCredential,
        StatusCode::TOO_MANY_REQUESTS => CorrectionError::RateLimited,
        StatusCode::BAD_REQUEST => CorrectionError::BadRequest(error_detail(response)),
        status => CorrectionError::Upstream {
            status,
            detail: error_detail(response),
        },
    }
}

fn error_detail(response: &HttpResponse) -> Option<String> {
    let body: ApiErrorBody = serde_json::from_slice(&response.body).ok()?;
    match body.message? {
        serde_json::Value::String(message) if !message.trim().is_empty() => Some(message),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_completion(body: &[u8]) -> Result<CorrectionResult, CorrectionError> {
    let completion: ChatCompletion = serde_json::from_slice(body)
        .map_err(|error| CorrectionError::malformed(format!("invalid envelope: {error}")))?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| CorrectionError::malformed("empty response"))?;

    parse_correction_content(&content)
}

pub(crate) fn parse_correction_content(content: &str) -> Result<CorrectionResult, CorrectionError> {
    let raw: RawCorrection = serde_json::from_str(content)
        .map_err(|error| CorrectionError::malformed(format!("invalid JSON: {error}")))?;

    let corrected_text = raw
        .corrected_text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| CorrectionError::malformed("correctedText missing"))?;

    Ok(CorrectionResult {
        corrected_text,
        mistakes: raw.mistakes.map(parse_mistakes).unwrap_or_default(),
        summary: raw
            .summary
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_SUMMARY.to_string()),
    })
}

/// Keep every well-formed entry; a bad entry never sinks the correction.
fn parse_mistakes(value: serde_json::Value) -> Vec<Mistake> {
    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Null => return Vec::new(),
        other => {
            warn!("Ignoring non-list mistakes field: {other}");
            return Vec::new();
        }
    };
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawMistake>(entry) {
            Ok(raw) => raw.into_mistake(),
            Err(error) => {
                warn!("Dropping unreadable mistake: {error}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::ScriptedTransport;

    fn client(transport: &Arc<ScriptedTransport>) -> CorrectionClient {
        let transport: Arc<dyn HttpTransport> = transport.clone();
        CorrectionClient::new(transport, DEFAULT_API_BASE_URL)
    }

    fn request(text: &str) -> CorrectionRequest {
        CorrectionRequest {
            source_text: text.to_string(),
            category_context: None,
            model_id: DEFAULT_MODEL.to_string(),
            api_key: Some(ApiKey::new("sk-test-0123456789")),
        }
    }

    fn completion(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    #[tokio::test]
    async fn blank_input_fails_without_network_call() {
        let transport = Arc::new(ScriptedTransport::respond(200, "{}"));
        let client = client(&transport);

        for text in ["", "   ", "\n\t"] {
            let error = client.correct(&request(text)).await.expect_err("blank input");
            assert_eq!(error, CorrectionError::EmptyInput);
            assert_eq!(error.class(), ErrorClass::Input);
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network_call() {
        let transport = Arc::new(ScriptedTransport::respond(200, "{}"));
        let client = client(&transport);

        let mut without_key = request("Bonjour");
        without_key.api_key = None;
        assert_eq!(
            client.correct(&without_key).await,
            Err(CorrectionError::MissingCredential)
        );

        without_key.api_key = Some(ApiKey::new("  "));
        assert_eq!(
            client.correct(&without_key).await,
            Err(CorrectionError::MissingCredential)
        );
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn request_body_carries_sampling_and_format_constraints() {
        let content = r#"{"correctedText":"Bonjour.","mistakes":[],"summary":"RAS"}"#;
        let transport = Arc::new(ScriptedTransport::respond(200, &completion(content)));
        let client = client(&transport);

        let mut req = request("Bonjour.");
        req.category_context = Some("Courriel professionnel".to_string());
        client.correct(&req).await.expect("valid response");

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.mistral.ai/v1/chat/completions");
        assert_eq!(
            sent.header_value("authorization"),
            Some("Bearer sk-test-0123456789")
        );
        let body: serde_json::Value =
            serde_json::from_slice(sent.body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 4096);
        assert!((body["temperature"].as_f64().expect("number") - 0.1).abs() < 1e-6);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(
            body["messages"][0]["content"]
                .as_str()
                .expect("system prompt")
                .ends_with("Contexte spécifique: Courriel professionnel")
        );
        assert_eq!(body["messages"][1]["content"], "Corrige ce texte:\n\nBonjour.");
    }

    #[test]
    fn system_prompt_ignores_blank_context() {
        assert_eq!(system_prompt(Some("  ")), SYSTEM_PROMPT);
        assert_eq!(system_prompt(None), SYSTEM_PROMPT);
        for kind in MistakeKind::ALL {
            assert!(SYSTEM_PROMPT.contains(kind.as_str()), "{kind} missing");
        }
    }

    #[tokio::test]
    async fn status_codes_map_to_error_classes() {
        let cases = [
            (401, ErrorClass::Auth),
            (429, ErrorClass::Quota),
            (400, ErrorClass::Request),
            (500, ErrorClass::Upstream),
            (503, ErrorClass::Upstream),
        ];
        for (status, class) in cases {
            let transport = Arc::new(ScriptedTransport::respond(status, "{}"));
            let error = client(&transport)
                .correct(&request("Bonjour"))
                .await
                .expect_err("non-2xx");
            assert_eq!(error.class(), class, "HTTP {status}");
        }
    }

    #[tokio::test]
    async fn bad_request_surfaces_server_detail() {
        let transport = Arc::new(ScriptedTransport::respond(
            400,
            r#"{"message":"Invalid model: mistral-huge"}"#,
        ));
        let error = client(&transport)
            .correct(&request("Bonjour"))
            .await
            .expect_err("bad request");
        assert_eq!(
            error,
            CorrectionError::BadRequest(Some("Invalid model: mistral-huge".to_string()))
        );
        assert!(error.to_string().contains("Invalid model: mistral-huge"));
    }

    #[tokio::test]
    async fn transport_failure_is_classified() {
        let transport = Arc::new(ScriptedTransport::unreachable());
        let error = client(&transport)
            .correct(&request("Bonjour"))
            .await
            .expect_err("unreachable");
        assert_eq!(error.class(), ErrorClass::Transport);
    }

    #[tokio::test]
    async fn missing_content_or_fields_is_response_format_error() {
        let bodies = [
            json!({"choices": []}).to_string(),
            json!({"choices": [{"message": {"content": null}}]}).to_string(),
            completion("pas du JSON"),
            completion(r#"{"mistakes":[],"summary":"ok"}"#),
            completion(r#"{"correctedText":"","mistakes":[]}"#),
            "not json at all".to_string(),
        ];
        for body in bodies {
            let transport = Arc::new(ScriptedTransport::respond(200, &body));
            let error = client(&transport)
                .correct(&request("Bonjour"))
                .await
                .expect_err("malformed");
            assert_eq!(error.class(), ErrorClass::ResponseFormat, "{body}");
        }
    }

    #[test]
    fn omitted_mistakes_and_summary_get_defaults() {
        let result = parse_correction_content(r#"{"correctedText":"Bonjour."}"#)
            .expect("correctedText is enough");
        assert!(result.mistakes.is_empty());
        assert_eq!(result.summary, FALLBACK_SUMMARY);

        let result = parse_correction_content(
            r#"{"correctedText":"Bonjour.","mistakes":null,"summary":"  "}"#,
        )
        .expect("nulls default");
        assert!(result.mistakes.is_empty());
        assert_eq!(result.summary, FALLBACK_SUMMARY);
    }

    #[test]
    fn kind_labels_match_ignoring_case() {
        let result = parse_correction_content(
            r#"{"correctedText":"Je suis allé au magasin.","mistakes":[
                {"type":"Orthographe","original":"magazin","correction":"magasin"},
                {"type":" ACCORD ","original":"allée","correction":"allé","explanation":"sujet masculin"}
            ]}"#,
        )
        .expect("capitalized kinds are accepted");

        assert_eq!(result.corrected_text, "Je suis allé au magasin.");
        assert_eq!(result.mistakes.len(), 2);
        assert_eq!(result.mistakes[0].kind, MistakeKind::Spelling);
        assert_eq!(result.mistakes[0].explanation, "");
        assert_eq!(result.mistakes[1].kind, MistakeKind::Agreement);
    }

    #[test]
    fn bad_mistake_entries_are_dropped_not_fatal() {
        let result = parse_correction_content(
            r#"{"correctedText":"Je suis allé au magasin.","mistakes":[
                {"type":"vocabulaire","original":"a","correction":"b"},
                {"original":"sans type"},
                "pas un objet",
                {"type":"conjugaison","correction":"suis"}
            ],"summary":"Une faute."}"#,
        )
        .expect("correctedText survives bad entries");

        assert_eq!(
            result.mistakes,
            vec![Mistake {
                kind: MistakeKind::Conjugation,
                original: String::new(),
                replacement: "suis".to_string(),
                explanation: String::new(),
            }]
        );
        assert_eq!(result.summary, "Une faute.");

        let result = parse_correction_content(r#"{"correctedText":"ok","mistakes":"aucune"}"#)
            .expect("non-list mistakes default to empty");
        assert!(result.mistakes.is_empty());
    }

    #[test]
    fn english_kind_names_are_accepted() {
        let result = parse_correction_content(
            r#"{"correctedText":"ok","mistakes":[{"type":"agreement","original":"a","correction":"b","explanation":"c"}]}"#,
        )
        .expect("alias kind");
        assert_eq!(result.mistakes[0].kind, MistakeKind::Agreement);
    }

    #[test]
    fn error_messages_are_distinct_per_class() {
        let errors = [
            CorrectionError::EmptyInput,
            CorrectionError::MissingCredential,
            CorrectionError::InvalidCredential,
            CorrectionError::RateLimited,
            CorrectionError::BadRequest(None),
            CorrectionError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                detail: None,
            },
            CorrectionError::malformed("x"),
            CorrectionError::Transport(TransportError::new("request failed", "timeout")),
        ];
        for (i, a) in errors.iter().enumerate() {
            for b in &errors[i + 1..] {
                assert_ne!(a.to_string(), b.to_string());
            }
        }
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        let req = request("x");
        assert!(!format!("{req:?}").contains("sk-test"));
    }
}
