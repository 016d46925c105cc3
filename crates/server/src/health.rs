use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use rollcall_core::registry::SessionRegistry;

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<SessionRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionGauge {
    pub active: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: SessionGauge,
    pub checked_at: String,
}

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry })
}

/// Running HTTP server plus the handle used to stop it gracefully.
pub struct ServerHandle {
    task: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl ServerHandle {
    /// Signals the server to stop accepting work and waits up to `drain` for
    /// in-flight requests to finish before aborting.
    pub async fn shutdown(self, drain: Duration) {
        let Self { mut task, shutdown_tx } = self;
        let _ = shutdown_tx.send(());
        if tokio::time::timeout(drain, &mut task).await.is_err() {
            task.abort();
        }
    }
}

pub async fn spawn(bind_address: &str, port: u16, router: Router) -> std::io::Result<ServerHandle> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    let task = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(error) = serve.await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http server terminated unexpectedly"
            );
        }
    });

    Ok(ServerHandle { task, shutdown_tx })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "rollcall-server runtime initialized".to_string(),
        },
        sessions: SessionGauge { active: state.registry.active_count() },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
