//! Webhook HTTP boundary.
//!
//! `POST /webhook` receives GitHub deliveries, verifies their signature,
//! and runs each `pull_request` event through [`dispatch`] under a
//! per-event deadline. `GET /healthz` answers liveness probes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use miette::{IntoDiagnostic, WrapErr};
use papa_core::{PapaConfig, PapaError};
use papa_review::dispatch::{self, dispatch};
use papa_review::event::{parse_event, PullRequestEvent};
use papa_review::pipeline::ReviewPipeline;
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";

/// Pending pipeline construction returned by a [`Connector`].
pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<ReviewPipeline, PapaError>> + Send>>;

/// Builds the review pipeline for one eligible event.
pub type Connector = Arc<dyn Fn(PullRequestEvent) -> ConnectFuture + Send + Sync>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    webhook_secret: Option<String>,
    deadline: Duration,
    connect: Connector,
}

impl AppState {
    /// State that authenticates against GitHub with `config` for every
    /// eligible event.
    pub fn new(config: Arc<PapaConfig>) -> Self {
        let webhook_secret = config.github.webhook_secret.clone();
        let deadline = Duration::from_secs(config.server.deadline_secs);
        let connect: Connector = Arc::new(move |event: PullRequestEvent| -> ConnectFuture {
            let config = Arc::clone(&config);
            Box::pin(async move { dispatch::connect(&config, event.installation_id).await })
        });
        Self::with_connector(webhook_secret, deadline, connect)
    }

    /// State with an explicit pipeline builder in place of GitHub authentication.
    pub fn with_connector(
        webhook_secret: Option<String>,
        deadline: Duration,
        connect: Connector,
    ) -> Self {
        Self {
            webhook_secret,
            deadline,
            connect,
        }
    }
}

/// Routes for the webhook and health endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: Arc<PapaConfig>) -> miette::Result<()> {
    let bind = config.server.bind.clone();
    if config.github.webhook_secret.is_none() {
        tracing::warn!("no webhook secret configured, deliveries will not be authenticated");
    }

    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "listening for GitHub webhooks");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()
        .wrap_err("webhook server failed")
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let delivery = header_str(&headers, DELIVERY_HEADER).unwrap_or("-").to_string();

    if let Some(secret) = &state.webhook_secret {
        let signature = header_str(&headers, SIGNATURE_HEADER);
        if !verify_signature(secret.as_bytes(), &body, signature) {
            tracing::warn!(%delivery, "rejecting delivery with invalid signature");
            return reply(
                StatusCode::UNAUTHORIZED,
                json!({ "status": "rejected", "error": "invalid signature" }),
            );
        }
    }

    if let Some(kind) = header_str(&headers, EVENT_HEADER) {
        if kind != "pull_request" {
            tracing::debug!(%delivery, event = kind, "ignoring non pull_request delivery");
            return reply(StatusCode::OK, json!({ "status": "ignored", "event": kind }));
        }
    }

    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(%delivery, error = %err, "malformed webhook payload");
            return reply(
                StatusCode::BAD_REQUEST,
                json!({ "status": "malformed", "error": err.to_string() }),
            );
        }
    };

    let connect = Arc::clone(&state.connect);
    let run = dispatch(&event, move |event: &PullRequestEvent| connect(event.clone()));
    match tokio::time::timeout(state.deadline, run).await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(err)) => {
            tracing::error!(%delivery, target = %event.target(), error = %err, "event processing failed");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "status": "failed", "error": err.to_string() }),
            )
        }
        Err(_) => {
            tracing::error!(
                %delivery,
                target = %event.target(),
                deadline_secs = state.deadline.as_secs(),
                "event processing exceeded its deadline"
            );
            reply(
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "status": "timedOut", "target": event.target().to_string() }),
            )
        }
    }
}

/// Check a `sha256=<hex>` signature header against the payload.
///
/// The comparison is constant-time.
pub fn verify_signature(secret: &[u8], payload: &[u8], header: Option<&str>) -> bool {
    let Some(encoded) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(encoded) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use papa_core::{AnalysisError, ReviewConfig};
    use papa_review::pipeline::{Analyzer, SourceControl};
    use papa_review::testing::{RecordingAnalyzer, RecordingSourceControl};
    use tower::ServiceExt;

    const SECRET: &str = "It's a Secret to Everybody";

    fn sign(payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn payload(action: &str) -> Vec<u8> {
        json!({
            "action": action,
            "number": 7,
            "repository": { "name": "hello", "owner": { "login": "octocat" } },
            "installation": { "id": 99 }
        })
        .to_string()
        .into_bytes()
    }

    fn recording_connector(
        scm: Arc<RecordingSourceControl>,
        analyzer: Arc<dyn Analyzer>,
        connects: Arc<AtomicUsize>,
    ) -> Connector {
        Arc::new(move |_event: PullRequestEvent| -> ConnectFuture {
            connects.fetch_add(1, Ordering::SeqCst);
            let scm: Arc<dyn SourceControl> = scm.clone();
            let pipeline = ReviewPipeline::new(
                scm,
                Arc::clone(&analyzer),
                ReviewConfig::default(),
            );
            Box::pin(async move { Ok(pipeline) })
        })
    }

    fn failing_connector() -> Connector {
        Arc::new(|_event: PullRequestEvent| -> ConnectFuture {
            Box::pin(async { Err(PapaError::Authentication("bad credentials".into())) })
        })
    }

    fn request(event: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/webhook")
            .header("content-type", "application/json")
            .header(EVENT_HEADER, event);
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    struct SlowAnalyzer;

    #[async_trait]
    impl Analyzer for SlowAnalyzer {
        async fn analyze(&self, _diff: &str) -> Result<String, AnalysisError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }
    }

    #[test]
    fn signature_roundtrip_verifies() {
        let body = br#"{"action":"opened"}"#;
        assert!(verify_signature(SECRET.as_bytes(), body, Some(sign(body).as_str())));
    }

    #[test]
    fn signature_rejects_tampering_and_garbage() {
        let body = br#"{"action":"opened"}"#;
        let signature = sign(body);
        assert!(!verify_signature(SECRET.as_bytes(), br#"{"action":"closed"}"#, Some(signature.as_str())));
        assert!(!verify_signature(b"other secret", body, Some(signature.as_str())));
        assert!(!verify_signature(SECRET.as_bytes(), body, None));
        assert!(!verify_signature(SECRET.as_bytes(), body, Some("sha256=not-hex")));
        assert!(!verify_signature(
            SECRET.as_bytes(),
            body,
            Some(signature.trim_start_matches("sha256="))
        ));
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = router(AppState::with_connector(None, Duration::from_secs(5), failing_connector()));
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn eligible_event_posts_one_review() {
        let scm = Arc::new(RecordingSourceControl::new().with_diff("+fn main() {}"));
        let connects = Arc::new(AtomicUsize::new(0));
        let connect = recording_connector(
            Arc::clone(&scm),
            Arc::new(RecordingAnalyzer::responding("Looks fine.")),
            Arc::clone(&connects),
        );
        let app = router(AppState::with_connector(
            Some(SECRET.into()),
            Duration::from_secs(5),
            connect,
        ));

        let body = payload("synchronize");
        let signature = sign(&body);
        let response = app
            .oneshot(request("pull_request", body, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "reviewed");
        assert_eq!(json["outcome"]["outcome"], "posted");
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(scm.posted().len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let connects = Arc::new(AtomicUsize::new(0));
        let connect = recording_connector(
            Arc::new(RecordingSourceControl::new()),
            Arc::new(RecordingAnalyzer::responding("x")),
            Arc::clone(&connects),
        );
        let app = router(AppState::with_connector(
            Some(SECRET.into()),
            Duration::from_secs(5),
            connect,
        ));

        let response = app
            .oneshot(request(
                "pull_request",
                payload("opened"),
                Some(sign(b"something else")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ping_is_ignored() {
        let app = router(AppState::with_connector(None, Duration::from_secs(5), failing_connector()));
        let response = app
            .oneshot(request("ping", br#"{"zen":"Keep it logically awesome."}"#.to_vec(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let app = router(AppState::with_connector(None, Duration::from_secs(5), failing_connector()));
        let response = app
            .oneshot(request("pull_request", b"{not json".to_vec(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "malformed");
    }

    #[tokio::test]
    async fn ineligible_action_is_ok_without_connecting() {
        let connects = Arc::new(AtomicUsize::new(0));
        let connect = recording_connector(
            Arc::new(RecordingSourceControl::new()),
            Arc::new(RecordingAnalyzer::responding("x")),
            Arc::clone(&connects),
        );
        let app = router(AppState::with_connector(None, Duration::from_secs(5), connect));

        let response = app
            .oneshot(request("pull_request", payload("closed"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ineligible");
        assert_eq!(json["action"], "closed");
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authentication_failure_is_server_error() {
        let app = router(AppState::with_connector(None, Duration::from_secs(5), failing_connector()));
        let response = app
            .oneshot(request("pull_request", payload("opened"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["status"], "failed");
        assert!(json["error"].as_str().unwrap().contains("bad credentials"));
    }

    #[tokio::test]
    async fn deadline_cancels_the_run() {
        let scm = Arc::new(RecordingSourceControl::new().with_diff("+x"));
        let connect = recording_connector(
            Arc::clone(&scm),
            Arc::new(SlowAnalyzer),
            Arc::new(AtomicUsize::new(0)),
        );
        let app = router(AppState::with_connector(None, Duration::from_millis(50), connect));

        let response = app
            .oneshot(request("pull_request", payload("reopened"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(scm.posted().is_empty());
    }
}
