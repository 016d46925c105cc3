//! Manual trigger surface for roll-call sessions.
//!
//! - `POST /sessions`              — start a session for a topic
//! - `GET  /sessions/{id}`         — point-in-time snapshot (roster, pending, state)
//! - `POST /sessions/{id}/cancel`  — stop a session; repeatable

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use rollcall_core::errors::InterfaceError;
use rollcall_core::registry::SessionSnapshot;
use rollcall_core::service::{CreateSessionRequest, SessionService};
use rollcall_core::session::{SessionId, Topic};

#[derive(Clone)]
pub struct TriggerState {
    pub service: Arc<SessionService>,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub topic: String,
    pub interval_secs: Option<u64>,
    pub expires_in_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub session_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(state: TriggerState) -> Router {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{id}", get(session_status))
        .route("/sessions/{id}/cancel", post(cancel_session))
        .with_state(state)
}

async fn start_session(
    State(state): State<TriggerState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionResponse>), (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();

    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(error_response(InterfaceError::BadRequest {
            message: "topic must not be empty".to_owned(),
            correlation_id,
        }));
    }

    let create = CreateSessionRequest {
        topic: Topic(topic.to_owned()),
        interval: request.interval_secs.map(Duration::from_secs),
        expires_in: request.expires_in_secs.map(Duration::from_secs),
    };

    match state.service.create(create).await {
        Ok(session_id) => {
            info!(
                event_name = "trigger.session_started",
                correlation_id = %correlation_id,
                session_id = %session_id,
                topic,
                "session started via http trigger"
            );
            Ok((StatusCode::CREATED, Json(StartSessionResponse { session_id: session_id.0 })))
        }
        Err(error) => Err(error_response(error.into_interface(correlation_id))),
    }
}

async fn session_status(
    State(state): State<TriggerState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();
    match state.service.status(&SessionId(id.clone())) {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(error_response(InterfaceError::NotFound {
            message: format!("no session `{id}`"),
            correlation_id,
        })),
    }
}

async fn cancel_session(
    State(state): State<TriggerState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = SessionId(id.clone());

    if state.service.status(&session_id).is_none() {
        return Err(error_response(InterfaceError::NotFound {
            message: format!("no session `{id}`"),
            correlation_id,
        }));
    }

    let cancelled = state.service.cancel(&session_id);
    Ok(Json(CancelResponse { session_id: id, cancelled }))
}

fn status_code(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: InterfaceError) -> (StatusCode, Json<ErrorBody>) {
    let status = status_code(&error);
    let body = ErrorBody {
        error: error.user_message().to_owned(),
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use rollcall_core::notify::{NoopNotifier, Notifier};
    use rollcall_core::registry::SessionRegistry;
    use rollcall_core::roster::{RosterSource, StaticRosterSource};
    use rollcall_core::scheduler::EscalationScheduler;
    use rollcall_core::service::{SessionDefaults, SessionService};
    use rollcall_core::session::UserId;

    use super::{router, TriggerState};

    fn test_router() -> (Arc<EscalationScheduler>, axum::Router) {
        let registry = Arc::new(SessionRegistry::new());
        let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        let scheduler =
            Arc::new(EscalationScheduler::new(Arc::clone(&registry), Arc::clone(&notifier)));
        let roster: Arc<dyn RosterSource> = Arc::new(StaticRosterSource::new(vec![
            UserId("U1".to_owned()),
            UserId("U2".to_owned()),
        ]));
        let service = Arc::new(SessionService::new(
            registry,
            Arc::clone(&scheduler),
            roster,
            notifier,
            SessionDefaults { interval: Duration::from_secs(60), ..SessionDefaults::default() },
        ));
        (scheduler, router(TriggerState { service }))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn start_status_cancel_round_trip() {
        let (scheduler, app) = test_router();

        let response = app
            .clone()
            .oneshot(post_json("/sessions", json!({"topic": "C1", "interval_secs": 60})))
            .await
            .expect("start");
        assert_eq!(response.status(), StatusCode::CREATED);
        let session_id =
            body_json(response).await["session_id"].as_str().expect("session id").to_owned();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("status");
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = body_json(response).await;
        assert_eq!(snapshot["state"], "active");
        assert_eq!(snapshot["pending"].as_array().map(Vec::len), Some(2));

        let response = app
            .clone()
            .oneshot(post_json(&format!("/sessions/{session_id}/cancel"), json!({})))
            .await
            .expect("cancel");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["cancelled"], true);

        // Cancelling again is a no-op, not an error.
        let response = app
            .oneshot(post_json(&format!("/sessions/{session_id}/cancel"), json!({})))
            .await
            .expect("cancel again");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["cancelled"], false);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn duplicate_start_for_topic_returns_conflict() {
        let (scheduler, app) = test_router();

        let first = app
            .clone()
            .oneshot(post_json("/sessions", json!({"topic": "C1"})))
            .await
            .expect("start");
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(post_json("/sessions", json!({"topic": "C1"})))
            .await
            .expect("second start");
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = body_json(second).await;
        assert!(body["error"].as_str().expect("error").contains("already running"));
        assert!(!body["correlation_id"].as_str().expect("correlation id").is_empty());
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn empty_topic_is_a_bad_request() {
        let (_scheduler, app) = test_router();

        let response = app
            .oneshot(post_json("/sessions", json!({"topic": "  "})))
            .await
            .expect("start");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_returns_not_found() {
        let (_scheduler, app) = test_router();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/sessions/rs-missing")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("status");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post_json("/sessions/rs-missing/cancel", json!({})))
            .await
            .expect("cancel");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
