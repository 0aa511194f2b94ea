use axum::http::StatusCode;

/// Liveness probe.
pub async fn health_check() -> (StatusCode, String) {
    (StatusCode::OK, "Healthy!".to_string())
}
