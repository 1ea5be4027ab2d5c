use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server_time": Utc::now(),
    }))
}
