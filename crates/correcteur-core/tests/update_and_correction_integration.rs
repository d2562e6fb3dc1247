use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use correcteur_core::{
    ApiKey, ApplyResult, ArtifactDownloader, CorrectionClient, CorrectionError, CorrectionRequest,
    DEFAULT_API_BASE_URL, DownloadError, DownloadProgress, ErrorClass, FailureKind, FeedErrorKind,
    HttpRequest, HttpResponse, HttpTransport, Installer, MistakeKind, ReleaseFeed, ReleaseRecord,
    ReleaseSource, RepositorySlug, TransportError, UpdateController, UpdateState,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;

struct CannedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl CannedTransport {
    fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn ok(status: u16, body: &str) -> Arc<Self> {
        Self::new(vec![Ok(HttpResponse::new(
            StatusCode::from_u16(status).expect("valid status"),
            body.as_bytes().to_vec(),
        ))])
    }
}

#[async_trait]
impl HttpTransport for CannedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().expect("seen lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .expect("canned response")
    }
}

struct StaticDownloader(PathBuf);

#[async_trait]
impl ArtifactDownloader for StaticDownloader {
    async fn download(
        &self,
        _release: &ReleaseRecord,
        progress: mpsc::Sender<DownloadProgress>,
    ) -> Result<PathBuf, DownloadError> {
        let _ = progress
            .send(DownloadProgress {
                downloaded: 4,
                total: Some(4),
            })
            .await;
        Ok(self.0.clone())
    }
}

struct RecordingInstaller;

impl Installer for RecordingInstaller {
    fn install(&self, _artifact: &Path) -> Result<ApplyResult, DownloadError> {
        Ok(ApplyResult::ExitForInstaller)
    }
}

fn controller_for(transport: Arc<CannedTransport>, current: &str) -> UpdateController {
    let transport: Arc<dyn HttpTransport> = transport;
    let feed = ReleaseFeed::new(
        transport,
        RepositorySlug::parse("https://github.com/Correcteur-app/correcteur.git")
            .expect("valid repository"),
    );
    let source: Arc<dyn ReleaseSource> = Arc::new(feed);
    UpdateController::new(
        current,
        source,
        Arc::new(StaticDownloader(PathBuf::from("/tmp/Correcteur-2.0.0.AppImage"))),
        Arc::new(RecordingInstaller),
    )
}

#[tokio::test]
async fn feed_with_newer_tag_reaches_available_then_installs() {
    let transport = CannedTransport::ok(
        200,
        r#"[{"tag_name":"v2.0.0","name":"Correcteur 2.0.0","prerelease":false,"draft":false,
            "html_url":"https://github.com/Correcteur-app/correcteur/releases/tag/v2.0.0",
            "assets":[]}]"#,
    );
    let controller = controller_for(Arc::clone(&transport), "1.5.0");

    let state = controller.check_for_updates().await;

    let UpdateState::Available(release) = state else {
        panic!("expected an available update, got {state:?}");
    };
    assert_eq!(release.tag, "v2.0.0");
    let seen = transport.seen.lock().expect("seen lock");
    assert_eq!(
        seen[0].url,
        "https://api.github.com/repos/Correcteur-app/correcteur/releases"
    );
    drop(seen);

    let state = controller.download().await.expect("download from available");
    assert!(matches!(state, UpdateState::Downloaded(_)));
    assert_eq!(
        controller.install().expect("install from downloaded"),
        ApplyResult::ExitForInstaller
    );
}

#[tokio::test]
async fn feed_errors_stay_distinguishable_through_the_controller() {
    let rate_limited = HttpResponse::new(StatusCode::FORBIDDEN, "rate limit")
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1700000000");
    let cases = vec![
        (
            Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, "")),
            FeedErrorKind::Unauthorized,
        ),
        (Ok(rate_limited), FeedErrorKind::RateLimited),
        (
            Ok(HttpResponse::new(StatusCode::NOT_FOUND, "")),
            FeedErrorKind::NotFound,
        ),
        (
            Err(TransportError::new("request failed", "network unreachable")),
            FeedErrorKind::Network,
        ),
        (
            Ok(HttpResponse::new(StatusCode::OK, r#"{"message":"nope"}"#)),
            FeedErrorKind::MalformedResponse,
        ),
    ];

    let mut messages = Vec::new();
    for (response, expected) in cases {
        let controller = controller_for(CannedTransport::new(vec![response]), "1.0.0");

        let UpdateState::Failed(failure) = controller.check_for_updates().await else {
            panic!("expected failure for {expected:?}");
        };
        assert_eq!(failure.kind, FailureKind::Feed(expected));
        messages.push(failure.message);
    }

    for (index, message) in messages.iter().enumerate() {
        for other in &messages[index + 1..] {
            assert_ne!(message, other);
        }
    }
}

fn completion(content: &serde_json::Value) -> String {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
    })
    .to_string()
}

fn request(text: &str) -> CorrectionRequest {
    CorrectionRequest {
        source_text: text.to_string(),
        category_context: Some("Courriel professionnel".to_string()),
        model_id: "mistral-large-latest".to_string(),
        api_key: Some(ApiKey::new("sk-test-0123456789")),
    }
}

#[tokio::test]
async fn french_correction_is_returned_verbatim() {
    let content = serde_json::json!({
        "correctedText": "Je suis allé au magasin.",
        "mistakes": [{
            "type": "orthographe",
            "original": "alé",
            "correction": "allé",
            "explanation": "Le participe passé du verbe aller s'écrit avec deux l."
        }],
        "summary": "Une faute d'orthographe corrigée."
    });
    let transport = CannedTransport::ok(200, &completion(&content));
    let client = CorrectionClient::new(transport.clone(), DEFAULT_API_BASE_URL);

    let result = client
        .correct(&request("Je suis alé au magasin."))
        .await
        .expect("correction should succeed");

    assert_eq!(result.corrected_text, "Je suis allé au magasin.");
    assert_eq!(result.mistakes.len(), 1);
    assert_eq!(result.mistakes[0].kind, MistakeKind::Spelling);
    assert_eq!(result.mistakes[0].original, "alé");
    assert_eq!(result.mistakes[0].replacement, "allé");
    assert_eq!(result.summary, "Une faute d'orthographe corrigée.");

    let seen = transport.seen.lock().expect("seen lock");
    let body: serde_json::Value =
        serde_json::from_slice(seen[0].body.as_deref().expect("request body")).expect("json body");
    let system = body["messages"][0]["content"].as_str().expect("system prompt");
    assert!(system.ends_with("Contexte spécifique: Courriel professionnel"));
}

#[tokio::test]
async fn correction_failures_keep_their_class() {
    let cases: Vec<(Result<HttpResponse, TransportError>, ErrorClass)> = vec![
        (
            Ok(HttpResponse::new(StatusCode::UNAUTHORIZED, "")),
            ErrorClass::Auth,
        ),
        (
            Ok(HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, "")),
            ErrorClass::Quota,
        ),
        (
            Err(TransportError::new("request failed", "network unreachable")),
            ErrorClass::Transport,
        ),
        (
            Ok(HttpResponse::new(StatusCode::OK, r#"{"choices":[]}"#)),
            ErrorClass::ResponseFormat,
        ),
    ];

    let mut messages = Vec::new();
    for (response, expected) in cases {
        let client =
            CorrectionClient::new(CannedTransport::new(vec![response]), DEFAULT_API_BASE_URL);

        let error = client
            .correct(&request("Bonjour"))
            .await
            .expect_err("correction should fail");

        assert_eq!(error.class(), expected);
        messages.push(error.to_string());
    }
    messages.sort();
    messages.dedup();
    assert_eq!(messages.len(), 4);

    let client = CorrectionClient::new(CannedTransport::new(Vec::new()), DEFAULT_API_BASE_URL);
    let error = client
        .correct(&request("   "))
        .await
        .expect_err("blank text is rejected");
    assert!(matches!(error, CorrectionError::EmptyInput));
}
