//! Webhook HTTP surface.
//!
//! - `GET /webhook` — subscription handshake (`hub.mode`, `hub.verify_token`,
//!   `hub.challenge`)
//! - `POST /webhook` — event deliveries, acknowledged once dispatched
//! - `GET /health` — liveness probe

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::{EventDispatcher, WebhookPayload};

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<EventDispatcher>,
    pub verify_token: SecretString,
}

/// Handshake query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo if the handshake is valid.
pub fn verify_subscription(params: &VerifyParams, verify_token: &str) -> Option<String> {
    let mode = params.mode.as_deref()?;
    let token = params.token.as_deref()?;
    let challenge = params.challenge.as_deref()?;

    if mode == "subscribe" && tokens_match(token, verify_token) {
        Some(challenge.to_string())
    } else {
        None
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn tokens_match(given: &str, expected: &str) -> bool {
    let diff = given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |diff, (g, e)| diff | (g ^ e));
    given.len() == expected.len() && diff == 0
}

/// GET /webhook
async fn verify_webhook(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    match verify_subscription(&params, state.verify_token.expose_secret()) {
        Some(challenge) => {
            info!("Webhook verified");
            (StatusCode::OK, challenge)
        }
        None => {
            warn!(mode = ?params.mode, "Webhook verification failed");
            (StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

/// POST /webhook
///
/// Page deliveries are always acknowledged with 200 once dispatched, whatever
/// happened to individual replies.
async fn handle_delivery(
    State(state): State<WebhookState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    if !payload.is_page_event() {
        return (StatusCode::NOT_FOUND, "Not a page event").into_response();
    }

    let summary = state.dispatcher.dispatch(&payload).await;
    info!(
        replied = summary.replied,
        ignored = summary.ignored,
        failed = summary.failed,
        "Webhook delivery processed"
    );

    Json(serde_json::json!({"status": "ok"})).into_response()
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// Build the webhook routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(handle_delivery))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ReplyCatalog;
    use crate::error::{ChannelError, LookupError};
    use crate::pipeline::{
        IntentResolver, KeywordReplyRow, KeywordSource, OutgoingMessage, ReplyGateway,
        UserDirectory,
    };

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl ReplyGateway for RecordingGateway {
        async fn send(&self, message: &OutgoingMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message.clone());
            Err(ChannelError::Http("connection reset".into()))
        }
    }

    struct DownSource;

    #[async_trait]
    impl KeywordSource for DownSource {
        async fn list_keyword_replies(&self) -> Result<Vec<KeywordReplyRow>, LookupError> {
            Err(LookupError::RequestFailed {
                source_name: "sheets".into(),
                reason: "503 Service Unavailable".into(),
            })
        }
    }

    struct NoNames;

    #[async_trait]
    impl UserDirectory for NoNames {
        async fn resolve_display_name(&self, _sender_id: &str) -> String {
            "there".into()
        }
    }

    fn app(gateway: Arc<RecordingGateway>) -> Router {
        let catalog = Arc::new(ReplyCatalog::default());
        let resolver =
            IntentResolver::new(Arc::clone(&catalog), Arc::new(DownSource), Arc::new(NoNames));
        let dispatcher = Arc::new(EventDispatcher::new(catalog, resolver, gateway));
        webhook_routes(WebhookState {
            dispatcher,
            verify_token: SecretString::from("s3cret"),
        })
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn params(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerifyParams {
        VerifyParams {
            mode: mode.map(String::from),
            token: token.map(String::from),
            challenge: challenge.map(String::from),
        }
    }

    #[test]
    fn verify_subscription_valid() {
        let p = params(Some("subscribe"), Some("s3cret"), Some("challenge_123"));
        assert_eq!(
            verify_subscription(&p, "s3cret"),
            Some("challenge_123".to_string())
        );
    }

    #[test]
    fn verify_subscription_rejects() {
        assert_eq!(
            verify_subscription(&params(Some("subscribe"), Some("nope"), Some("c")), "s3cret"),
            None
        );
        assert_eq!(
            verify_subscription(&params(Some("unsubscribe"), Some("s3cret"), Some("c")), "s3cret"),
            None
        );
        assert_eq!(
            verify_subscription(&params(Some("subscribe"), Some("s3cret"), None), "s3cret"),
            None
        );
        assert_eq!(verify_subscription(&VerifyParams::default(), "s3cret"), None);
    }

    #[test]
    fn tokens_match_requires_same_bytes_and_length() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cres", "s3cret"));
        assert!(!tokens_match("s3cret", "s3cret!"));
        assert!(!tokens_match("s3c", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
    }

    #[tokio::test]
    async fn handshake_echoes_challenge() {
        let resp = app(Arc::default())
            .oneshot(
                Request::get(
                    "/webhook?hub.mode=subscribe&hub.verify_token=s3cret&hub.challenge=1158201444",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "1158201444");
    }

    #[tokio::test]
    async fn handshake_wrong_token_forbidden() {
        let resp = app(Arc::default())
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=x&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn delivery_acknowledged_despite_failures() {
        let gateway = Arc::new(RecordingGateway::default());
        let body = serde_json::json!({
            "object": "page",
            "entry": [{"messaging": [
                {"sender": {"id": "42"}, "message": {"text": "what's your price?"}},
                {"sender": {"id": "page"}, "message": {"is_echo": true, "text": "hi"}}
            ]}]
        });
        let resp = app(gateway.clone())
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, r#"{"status":"ok"}"#);

        // Keyword source down + send failure: one fallback reply attempted, echo skipped.
        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, ReplyCatalog::default().fallback_message);
    }

    #[tokio::test]
    async fn malformed_sub_event_does_not_reject_delivery() {
        let gateway = Arc::new(RecordingGateway::default());
        let body = serde_json::json!({
            "object": "page",
            "entry": [{"messaging": [
                {"sender": {"id": "42"}, "message": {"text": "hi"}},
                {"message": {"text": null, "is_echo": null}},
                {"sender": {"id": 17}, "message": {"text": "price"}}
            ]}]
        });
        let resp = app(gateway.clone())
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "42");
    }

    #[tokio::test]
    async fn non_page_delivery_not_found() {
        let gateway = Arc::new(RecordingGateway::default());
        let resp = app(gateway.clone())
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"object":"whatsapp_business_account","entry":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_ok() {
        let resp = app(Arc::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
