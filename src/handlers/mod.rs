use axum::Json;
use serde_json::json;

pub mod orders;
pub mod reports;

/// Liveness probe.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
