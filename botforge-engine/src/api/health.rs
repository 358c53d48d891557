//! Health check API handler
//!
//! Reports whether the engine can reach its build registry.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;

/// GET /health
///
/// Pings the registry so load balancers stop routing to an engine whose
/// database is gone.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!("Health check failed to reach the build registry: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "registry unreachable")
        }
    }
}
