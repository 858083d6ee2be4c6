//! Health check handler

use crate::error::ServerResult;
use axum::Json;
use serde_json::{json, Value};

/// Basic liveness check
pub async fn health_check() -> ServerResult<Json<Value>> {
    Ok(Json(json!({
        "status": "ok",
        "service": "kiln-server",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.unwrap();
        let json_value = response.0;

        assert_eq!(json_value["status"], "ok");
        assert_eq!(json_value["service"], "kiln-server");
        assert_eq!(json_value["version"], crate::VERSION);
        assert!(json_value["timestamp"].is_string());
    }
}
