//! Admin HTTP gateway: health, sweep history and manual sweeps.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gradewatch_obs::GradeSource;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::scheduler::FleetScheduler;

struct GatewayState<F> {
    fleet: FleetScheduler<F>,
    bearer_token: Option<String>,
}

impl<F> Clone for GatewayState<F> {
    fn clone(&self) -> Self {
        Self {
            fleet: self.fleet.clone(),
            bearer_token: self.bearer_token.clone(),
        }
    }
}

/// Build the gateway routes. `/health` is always open; the sweep routes
/// require the bearer token when one is configured.
pub fn router<F: GradeSource + 'static>(
    fleet: FleetScheduler<F>,
    bearer_token: Option<String>,
) -> Router {
    let bearer_token = bearer_token
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty());
    let state = GatewayState {
        fleet,
        bearer_token,
    };

    Router::new()
        .route("/health", get(gateway_health))
        .route("/sweeps", get(list_sweeps::<F>))
        .route("/sweep", post(trigger_sweep::<F>))
        .with_state(state)
}

/// Bind to the configured address and serve until `cancel` fires.
pub async fn run_gateway<F: GradeSource + 'static>(
    config: &GatewayConfig,
    fleet: FleetScheduler<F>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, router(fleet, config.bearer_token.clone()), cancel).await
}

/// Serve `app` on an already bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!("admin gateway listening on http://{local_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    tracing::info!("admin gateway stopped");
    Ok(())
}

async fn gateway_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

fn bearer_is_valid(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected_token) = expected else {
        return true;
    };
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let candidate = header_value
        .strip_prefix("Bearer ")
        .unwrap_or_default()
        .trim();
    !expected_token.is_empty() && candidate == expected_token
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "unauthorized"})),
    )
        .into_response()
}

async fn list_sweeps<F: GradeSource + 'static>(
    State(state): State<GatewayState<F>>,
    headers: HeaderMap,
) -> Response {
    if !bearer_is_valid(&headers, state.bearer_token.as_deref()) {
        return unauthorized();
    }
    Json(state.fleet.history().snapshot()).into_response()
}

async fn trigger_sweep<F: GradeSource + 'static>(
    State(state): State<GatewayState<F>>,
    headers: HeaderMap,
) -> Response {
    if !bearer_is_valid(&headers, state.bearer_token.as_deref()) {
        return unauthorized();
    }
    tracing::info!("manual sweep requested");
    Json(state.fleet.sweep().await).into_response()
}
